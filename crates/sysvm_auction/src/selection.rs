//! Clearing-price search and validator selection over a set of bids.
//!
//! Everything here is a pure function of its inputs. Collections whose
//! order affects the outcome are `BTreeMap`s keyed by BLS key bytes, so
//! every node expands and shuffles candidates in the same order.

use crate::{AuctionConfig, AuctionData, AuctionError};
use primitive_types::U256;
use std::collections::{BTreeMap, BTreeSet};
use sysvm_primitives::constants::TAG_SHUFFLE;
use sysvm_primitives::{h_tag, le_bytes, to_f64, u64_from_le};

/// The bid's keys in declaration order with repeats dropped.
///
/// A key listed twice (registered while double-key protection was off)
/// still backs a single node.
fn distinct_keys(bid: &AuctionData) -> Vec<&Vec<u8>> {
    let mut seen = BTreeSet::new();
    bid.bls_pub_keys.iter().filter(|k| seen.insert(k.as_slice())).collect()
}

/// Keys a bidder can fund at `node_price` and the stake backing them.
///
/// `None` when the bidder caps its per-node stake below the price, cannot
/// afford a single node, or declared no keys.
fn qualified_keys(bid: &AuctionData, node_price: &U256) -> Option<(u64, U256)> {
    if node_price.is_zero()
        || bid.max_stake_per_node < *node_price
        || bid.total_stake_value < *node_price
    {
        return None;
    }
    let declared = distinct_keys(bid).len() as u64;
    let max_possible = bid.total_stake_value / *node_price;
    let qualified = if max_possible > U256::from(declared) {
        (declared, node_price.saturating_mul(U256::from(declared)))
    } else {
        (max_possible.low_u64(), bid.total_stake_value)
    };
    (qualified.0 > 0).then_some(qualified)
}

/// Number of keys that qualify at `node_price` across all bids.
#[must_use]
pub fn calc_num_qualified_nodes(node_price: &U256, bids: &[AuctionData]) -> u64 {
    bids.iter()
        .filter_map(|bid| qualified_keys(bid, node_price))
        .fold(0u64, |acc, (n, _)| acc.saturating_add(n))
}

/// Stake backing the qualified keys at `node_price`.
#[must_use]
pub fn calc_total_qualifying_stake(node_price: &U256, bids: &[AuctionData]) -> U256 {
    bids.iter()
        .filter_map(|bid| qualified_keys(bid, node_price))
        .fold(U256::zero(), |acc, (_, stake)| acc.saturating_add(stake))
}

/// Highest price on the grid `TotalSupply / NumNodes - k * MinStep`
/// (not below `MinStakeValue`) at which enough keys qualify.
///
/// The qualified count never decreases as the price drops, so the grid is
/// binary searched instead of scanned.
pub fn calculate_node_price(config: &AuctionConfig, bids: &[AuctionData]) -> Result<U256, AuctionError> {
    if config.num_nodes == 0 {
        return Err(AuctionError::InvalidNumNodes(0));
    }
    if config.min_step.is_zero() {
        return Err(AuctionError::InvalidMinStepValue);
    }
    if config.min_stake_value.is_zero() {
        return Err(AuctionError::InvalidMinStakeValue);
    }
    let max_price = config.total_supply / U256::from(config.num_nodes);
    if max_price < config.min_stake_value {
        return Err(AuctionError::NotEnoughQualifiedNodes);
    }

    let needed = u64::from(config.num_nodes);
    let price_at = |k: U256| max_price - k * config.min_step;
    let enough = |k: U256| calc_num_qualified_nodes(&price_at(k), bids) >= needed;

    let last = (max_price - config.min_stake_value) / config.min_step;
    if !enough(last) {
        return Err(AuctionError::NotEnoughQualifiedNodes);
    }
    let (mut lo, mut hi) = (U256::zero(), last);
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if enough(mid) {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    Ok(price_at(lo))
}

/// Selects exactly `NumNodes` distinct keys (whenever a clearing price exists).
///
/// Each qualifying bidder first receives `floor(qualified * share)` keys,
/// where `share` is its part of the total qualifying stake. Remaining slots
/// are drawn at random, first among bidders left with no allocated key, then
/// among the qualified keys bidders hold beyond their allocation.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn select_nodes(
    config: &AuctionConfig,
    bids: &[AuctionData],
    random_seed: &[u8],
) -> Result<Vec<Vec<u8>>, AuctionError> {
    let node_price = calculate_node_price(config, bids)?;
    let total_qualifying = to_f64(&calc_total_qualifying_stake(&node_price, bids));

    let mut allocated_keys = Vec::new();
    let mut to_be_selected_random = BTreeMap::new();
    let mut reserve_pool = BTreeMap::new();
    for bid in bids {
        let Some((qualified, qualifying_stake)) = qualified_keys(bid, &node_price) else {
            continue;
        };
        let allocated = qualified as f64 * (to_f64(&qualifying_stake) / total_qualifying);
        let num_allocated = (allocated as u64).min(qualified) as usize;
        let fraction = allocated - num_allocated as f64;
        let distinct = distinct_keys(bid);
        let keys = &distinct[..qualified as usize];

        let reserve_from = if num_allocated == 0 {
            to_be_selected_random.insert(keys[0].clone(), fraction);
            1
        } else {
            num_allocated
        };
        for &key in &keys[reserve_from..] {
            reserve_pool.insert(key.clone(), fraction);
        }
        allocated_keys.extend(keys[..num_allocated].iter().map(|&k| k.clone()));
    }

    let num_nodes = config.num_nodes as usize;
    let mut chosen = BTreeSet::new();
    let mut selected = Vec::with_capacity(num_nodes);
    for key in allocated_keys {
        if selected.len() == num_nodes {
            break;
        }
        if chosen.insert(key.clone()) {
            selected.push(key);
        }
    }

    let seed = seed_prefix(random_seed);
    for pool in [&to_be_selected_random, &reserve_pool] {
        let needed = num_nodes.saturating_sub(selected.len());
        selected.extend(select_randomly(pool, needed, &seed, &mut chosen));
    }
    Ok(selected)
}

/// Weighted draw of up to `num_needed` keys not yet in `chosen`.
///
/// A key with fractional allocation `f` appears `floor(10 f) + 1` times in
/// the shuffled list; keys are taken in first-seen order.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn select_randomly(
    selectable: &BTreeMap<Vec<u8>, f64>,
    num_needed: usize,
    seed: &[u8; 8],
    chosen: &mut BTreeSet<Vec<u8>>,
) -> Vec<Vec<u8>> {
    if num_needed == 0 {
        return Vec::new();
    }
    let mut expanded: Vec<&Vec<u8>> = Vec::new();
    for (key, fraction) in selectable {
        if chosen.contains(key) {
            continue;
        }
        let weight = (fraction.clamp(0.0, 0.99) * 10.0) as usize + 1;
        expanded.extend(std::iter::repeat(key).take(weight));
    }
    shuffle(&mut expanded, seed);

    let mut picked = Vec::new();
    for key in expanded {
        if picked.len() == num_needed {
            break;
        }
        if chosen.insert(key.clone()) {
            picked.push(key.clone());
        }
    }
    picked
}

/// The first eight bytes of the block random seed, zero padded.
#[must_use]
pub fn seed_prefix(random_seed: &[u8]) -> [u8; 8] {
    let mut seed = [0u8; 8];
    let n = random_seed.len().min(8);
    seed[..n].copy_from_slice(&random_seed[..n]);
    seed
}

/// Fisher-Yates shuffle; draw `i` is `H(TAG_SHUFFLE, seed, LE64(i))`.
#[allow(clippy::cast_possible_truncation)]
pub fn shuffle<T>(list: &mut [T], seed: &[u8; 8]) {
    for (step, n) in (1..=list.len()).rev().enumerate() {
        let draw = h_tag(TAG_SHUFFLE, &[seed, &le_bytes::<8>(step as u128)]);
        let j = (u64_from_le(&draw) % n as u64) as usize;
        list.swap(n - 1, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bid(stake: u64, keys: usize, max_per_node: u64, tag: u8) -> AuctionData {
        AuctionData {
            total_stake_value: U256::from(stake),
            max_stake_per_node: U256::from(max_per_node),
            bls_pub_keys: (0..keys).map(|i| vec![tag, (i >> 8) as u8, i as u8]).collect(),
            ..AuctionData::default()
        }
    }

    #[test]
    fn qualification_caps_at_declared_keys() {
        let price = U256::from(10u64);
        assert_eq!(qualified_keys(&bid(100, 3, 50, 0), &price), Some((3, U256::from(30u64))));
        assert_eq!(qualified_keys(&bid(25, 3, 50, 0), &price), Some((2, U256::from(25u64))));
        assert_eq!(qualified_keys(&bid(100, 3, 9, 0), &price), None);
        assert_eq!(qualified_keys(&bid(9, 3, 50, 0), &price), None);
        assert_eq!(qualified_keys(&bid(100, 0, 50, 0), &price), None);
    }

    #[test]
    fn repeated_keys_count_once() {
        let mut b = bid(100, 2, 50, 0);
        b.bls_pub_keys.insert(1, b.bls_pub_keys[0].clone());
        assert_eq!(distinct_keys(&b), vec![&b.bls_pub_keys[0], &b.bls_pub_keys[2]]);
        assert_eq!(qualified_keys(&b, &U256::from(10u64)), Some((2, U256::from(20u64))));
    }

    #[test]
    fn shuffle_is_a_deterministic_permutation() {
        let mut a: Vec<u32> = (0..50).collect();
        let mut b = a.clone();
        shuffle(&mut a, &[1; 8]);
        shuffle(&mut b, &[1; 8]);
        assert_eq!(a, b);
        let mut sorted = a.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..50).collect::<Vec<_>>());
        let mut c: Vec<u32> = (0..50).collect();
        shuffle(&mut c, &[2; 8]);
        assert_ne!(a, c);
    }

    #[test]
    fn seed_prefix_pads_short_seeds() {
        assert_eq!(seed_prefix(&[1, 2]), [1, 2, 0, 0, 0, 0, 0, 0]);
        assert_eq!(seed_prefix(&[9; 32]), [9; 8]);
    }
}
