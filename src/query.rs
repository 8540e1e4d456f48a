use crate::models::{EnrichedRecord, StoredRow};

/// Rows that can be matched by product name.
pub trait ProductNamed {
    fn product_name(&self) -> &str;
}

impl ProductNamed for EnrichedRecord {
    fn product_name(&self) -> &str {
        &self.product_name
    }
}

impl ProductNamed for StoredRow {
    fn product_name(&self) -> &str {
        &self.product_name
    }
}

/// Case-insensitive substring search on product name. A blank query returns
/// the whole corpus; matches keep their original order.
pub fn search<T: ProductNamed + Clone>(corpus: &[T], query: &str) -> Vec<T> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return corpus.to_vec();
    }
    corpus
        .iter()
        .filter(|row| row.product_name().to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{search, ProductNamed};

    #[derive(Debug, Clone, PartialEq)]
    struct Item(&'static str);

    impl ProductNamed for Item {
        fn product_name(&self) -> &str {
            self.0
        }
    }

    fn corpus() -> Vec<Item> {
        vec![Item("Hex Bolt"), Item("Wing Nut"), Item("BOLT cutter"), Item("Washer")]
    }

    #[test]
    fn blank_query_returns_corpus_unchanged() {
        assert_eq!(search(&corpus(), ""), corpus());
        assert_eq!(search(&corpus(), "   "), corpus());
    }

    #[test]
    fn matches_ignore_case_and_keep_order() {
        assert_eq!(search(&corpus(), "bolt"), vec![Item("Hex Bolt"), Item("BOLT cutter")]);
        assert_eq!(search(&corpus(), "NUT"), vec![Item("Wing Nut")]);
    }

    #[test]
    fn unmatched_query_returns_nothing() {
        assert!(search(&corpus(), "gasket").is_empty());
        assert!(search::<Item>(&[], "bolt").is_empty());
    }

    #[test]
    fn non_ascii_names_fold_case() {
        let items = vec![Item("Tornillo ÁNGULO"), Item("Arandela")];
        assert_eq!(search(&items, "ángulo"), vec![Item("Tornillo ÁNGULO")]);
    }
}
