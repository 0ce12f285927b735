//! Deterministic keyword sharding across the fleet.

/// This server's share of `keyword_ids`.
///
/// `keyword_ids` must be in a stable order (ascending id) on every server;
/// position `k` belongs to server `k % total_servers`. A server may get an
/// empty shard when there are fewer keywords than servers.
pub fn shard<T: Copy>(keyword_ids: &[T], total_servers: usize, server_id: usize) -> Vec<T> {
    if total_servers == 0 || server_id >= total_servers {
        return Vec::new();
    }
    keyword_ids
        .iter()
        .enumerate()
        .filter(|(k, _)| k % total_servers == server_id)
        .map(|(_, id)| *id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_hundred_keywords_three_servers() {
        let ids: Vec<i32> = (1..=100).collect();
        let shards: Vec<Vec<i32>> = (0..3).map(|i| shard(&ids, 3, i)).collect();

        let sizes: Vec<usize> = shards.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![34, 33, 33]);

        let mut all: Vec<i32> = shards.concat();
        all.sort();
        assert_eq!(all, ids);
    }

    #[test]
    fn test_shards_are_disjoint_and_cover() {
        for total in 1..8usize {
            for len in [0usize, 1, 5, 7, 23, 64] {
                let ids: Vec<i32> = (0..len as i32).map(|i| i * 3 + 11).collect();
                let mut seen = HashSet::new();
                for server in 0..total {
                    for id in shard(&ids, total, server) {
                        assert!(seen.insert(id), "id {} assigned twice", id);
                    }
                }
                assert_eq!(seen.len(), ids.len());
            }
        }
    }

    #[test]
    fn test_small_catalog_leaves_servers_idle() {
        let ids = [10, 20];
        assert_eq!(shard(&ids, 4, 0), vec![10]);
        assert_eq!(shard(&ids, 4, 1), vec![20]);
        assert!(shard(&ids, 4, 3).is_empty());
    }

    #[test]
    fn test_deterministic() {
        let ids: Vec<i32> = (0..50).collect();
        assert_eq!(shard(&ids, 3, 2), shard(&ids, 3, 2));
        assert!(shard(&ids, 3, 3).is_empty());
    }
}
