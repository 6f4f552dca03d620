//! Result fusion
//!
//! Mixed-signal result lists are deduplicated by article while preserving
//! first-seen order; an article matched by several signals accumulates
//! their powers. Summing raw powers across signals is a policy choice,
//! not a calibrated weighting.

use crate::search::SearchResult;
use std::collections::HashMap;

/// Fuse an ordered list of results: keep the first occurrence per
/// article, add the power of later duplicates onto it, truncate to
/// `limit`.
pub fn fuse(results: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    let mut seen: HashMap<i64, usize> = HashMap::new();
    let mut fused: Vec<SearchResult> = Vec::new();

    for result in results {
        match seen.get(&result.article_id) {
            Some(&index) => fused[index].power += result.power,
            None => {
                seen.insert(result.article_id, fused.len());
                fused.push(result);
            }
        }
    }

    fused.truncate(limit);
    fused
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchKind;

    fn result(article_id: i64, power: f64, kind: SearchKind) -> SearchResult {
        SearchResult {
            article_id,
            title: format!("Article {}", article_id),
            entity: String::new(),
            section: String::new(),
            text: String::new(),
            kind,
            power,
        }
    }

    #[test]
    fn test_fuse_accumulates_power() {
        let fused = fuse(
            vec![
                result(1, 0.3, SearchKind::Title),
                result(2, 0.4, SearchKind::Title),
                result(1, 0.6, SearchKind::Vector),
            ],
            5,
        );

        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].article_id, 1);
        assert!((fused[0].power - 0.9).abs() < 1e-9);
        assert_eq!(fused[1].article_id, 2);
        assert!((fused[1].power - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_fuse_preserves_first_seen_order_and_kind() {
        let fused = fuse(
            vec![
                result(7, 1.0, SearchKind::Content),
                result(3, 2.0, SearchKind::Title),
                result(7, 0.5, SearchKind::Vector),
            ],
            5,
        );

        assert_eq!(fused[0].article_id, 7);
        assert_eq!(fused[0].kind, SearchKind::Content);
        assert_eq!(fused[1].article_id, 3);
    }

    #[test]
    fn test_fuse_truncates() {
        let inputs: Vec<SearchResult> = (0..10)
            .map(|i| result(i, i as f64, SearchKind::Title))
            .collect();
        let fused = fuse(inputs, 3);
        assert_eq!(fused.len(), 3);
        assert_eq!(fused[2].article_id, 2);
    }

    #[test]
    fn test_fuse_each_article_once() {
        let inputs = vec![
            result(1, 0.1, SearchKind::Title),
            result(1, 0.2, SearchKind::Content),
            result(1, 0.3, SearchKind::Vector),
            result(2, 0.4, SearchKind::Title),
        ];
        let fused = fuse(inputs, 10);

        assert_eq!(fused.len(), 2);
        let total: f64 = fused.iter().map(|r| r.power).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }
}
