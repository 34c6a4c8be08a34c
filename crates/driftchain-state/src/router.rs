//! Auto-routing: finds a chain of pools connecting two tokens.
//!
//! The router does a breadth-first search over the token graph implied by
//! the existing pools, returning the shortest pool path (fewest hops) from
//! `token_in` to `token_out`. It does not attempt to find the
//! price-optimal route among several equal-length paths; ties are broken
//! by pool id so the result is deterministic across nodes.

use std::collections::{HashMap, VecDeque};

use driftchain_types::pool::{LiquidityPool, PoolId};

/// Finds the shortest chain of pools connecting `token_in` to `token_out`,
/// using at most `max_hops` pools. Pools with no liquidity on either side
/// are skipped as unusable edges.
pub fn find_route(
    pools: &[LiquidityPool],
    token_in: &str,
    token_out: &str,
    max_hops: u32,
) -> Option<Vec<PoolId>> {
    if token_in == token_out {
        return Some(Vec::new());
    }

    // token -> sorted list of (neighbor_token, pool_id), sorted by pool id
    // for deterministic traversal and tie-breaking.
    let mut adjacency: HashMap<&str, Vec<(&str, &PoolId)>> = HashMap::new();
    for pool in pools {
        if !pool.has_liquidity() {
            continue;
        }
        adjacency
            .entry(pool.token_a.as_str())
            .or_default()
            .push((pool.token_b.as_str(), &pool.id));
        adjacency
            .entry(pool.token_b.as_str())
            .or_default()
            .push((pool.token_a.as_str(), &pool.id));
    }
    for edges in adjacency.values_mut() {
        edges.sort_by(|a, b| a.1.cmp(b.1));
    }

    let mut parent_token: HashMap<&str, &str> = HashMap::new();
    let mut parent_pool: HashMap<&str, &PoolId> = HashMap::new();
    let mut seen: HashMap<&str, u32> = HashMap::new();
    seen.insert(token_in, 0);

    let mut bfs_queue: VecDeque<&str> = VecDeque::new();
    bfs_queue.push_back(token_in);

    while let Some(current) = bfs_queue.pop_front() {
        let depth = seen[current];
        if depth >= max_hops {
            continue;
        }
        let Some(edges) = adjacency.get(current) else {
            continue;
        };
        for (neighbor, pool_id) in edges {
            if seen.contains_key(neighbor) {
                continue;
            }
            seen.insert(neighbor, depth + 1);
            parent_token.insert(neighbor, current);
            parent_pool.insert(neighbor, pool_id);
            if *neighbor == token_out {
                let mut path = Vec::new();
                let mut cursor = *neighbor;
                while cursor != token_in {
                    path.push(parent_pool[cursor].clone());
                    cursor = parent_token[cursor];
                }
                path.reverse();
                return Some(path);
            }
            bfs_queue.push_back(neighbor);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftchain_numeric::Amount;

    fn liquid_pool(a: &str, b: &str) -> LiquidityPool {
        let mut pool = LiquidityPool::new(a.to_string(), b.to_string(), 0);
        pool.reserve_a = Amount::from(1000u64);
        pool.reserve_b = Amount::from(1000u64);
        pool
    }

    #[test]
    fn finds_a_direct_route_when_a_pool_exists() {
        let pools = vec![liquid_pool("DRIFT", "USDT")];
        let route = find_route(&pools, "DRIFT", "USDT", 4).unwrap();
        assert_eq!(route, vec!["DRIFT/USDT".to_string()]);
    }

    #[test]
    fn finds_a_two_hop_route_through_an_intermediate_token() {
        let pools = vec![liquid_pool("DRIFT", "USDC"), liquid_pool("USDC", "USDT")];
        let route = find_route(&pools, "DRIFT", "USDT", 4).unwrap();
        assert_eq!(route.len(), 2);
    }

    #[test]
    fn respects_max_hops() {
        let pools = vec![liquid_pool("DRIFT", "USDC"), liquid_pool("USDC", "USDT")];
        assert!(find_route(&pools, "DRIFT", "USDT", 1).is_none());
        assert!(find_route(&pools, "DRIFT", "USDT", 2).is_some());
    }

    #[test]
    fn ignores_pools_with_no_liquidity() {
        let pools = vec![LiquidityPool::new("DRIFT".into(), "USDT".into(), 0)];
        assert!(find_route(&pools, "DRIFT", "USDT", 4).is_none());
    }

    #[test]
    fn same_token_returns_an_empty_route() {
        let pools: Vec<LiquidityPool> = vec![];
        assert_eq!(find_route(&pools, "DRIFT", "DRIFT", 4), Some(Vec::new()));
    }
}
