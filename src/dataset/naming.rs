//! Column-name standardisation (`First Name ` -> `first_name`).

use std::collections::HashSet;

/// Normalise a single column name to `snake_case`-ish ASCII-friendly form.
pub fn sanitize_column_name(name: &str) -> String {
    let mut result = String::with_capacity(name.len());
    let mut last_was_underscore = false;

    for c in name.trim().to_lowercase().chars() {
        if c.is_alphanumeric() {
            result.push(c);
            last_was_underscore = false;
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }

    let result = result.trim_matches('_');

    if result.is_empty() {
        "col".to_owned()
    } else if result.starts_with(|c: char| c.is_ascii_digit()) {
        format!("col_{result}")
    } else {
        result.to_owned()
    }
}

/// Normalise a list of names, suffixing `_1`, `_2`, ... to keep them unique.
pub fn sanitize_column_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();

    names
        .iter()
        .map(|name| {
            let base = sanitize_column_name(name);
            let mut clean = base.clone();
            let mut count = 0;
            while seen.contains(&clean) {
                count += 1;
                clean = format!("{base}_{count}");
            }
            seen.insert(clean.clone());
            clean
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_column_name() {
        assert_eq!(sanitize_column_name("  First Name "), "first_name");
        assert_eq!(sanitize_column_name("Unit Price ($)"), "unit_price");
        assert_eq!(sanitize_column_name("order--date"), "order_date");
        assert_eq!(sanitize_column_name("2024 Sales"), "col_2024_sales");
        assert_eq!(sanitize_column_name("%%%"), "col");
        assert_eq!(sanitize_column_name("Größe"), "größe");
    }

    #[test]
    fn test_sanitize_column_names_deduplicates() {
        let names = vec![
            "Price".to_owned(),
            "price ".to_owned(),
            "PRICE".to_owned(),
            "price_1".to_owned(),
        ];
        assert_eq!(
            sanitize_column_names(&names),
            vec!["price", "price_1", "price_2", "price_1_1"]
        );
    }
}
