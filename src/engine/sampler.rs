use rand::Rng;

/// Weighted random sample without replacement (Efraimidis-Spirakis keys).
///
/// Each item gets the key `u^(1/w)` with `u` uniform in [0, 1); the `k` items
/// with the largest keys win. Non-positive weights get key 0 and are only
/// picked once everything else is exhausted. The result is sorted ascending.
pub fn weighted_sample_without_replacement<R: Rng + ?Sized>(
    population: &[u8],
    weights: &[f64],
    k: usize,
    rng: &mut R,
) -> Vec<u8> {
    debug_assert_eq!(population.len(), weights.len());

    let mut keyed: Vec<(f64, u8)> = population
        .iter()
        .zip(weights)
        .map(|(&n, &w)| {
            let u: f64 = rng.gen();
            let key = if w > 0.0 { u.powf(1.0 / w) } else { 0.0 };
            (key, n)
        })
        .collect();

    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut picked: Vec<u8> = keyed.into_iter().take(k).map(|(_, n)| n).collect();
    picked.sort_unstable();
    picked
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_sample_is_sorted_and_unique() {
        let mut rng = StdRng::seed_from_u64(7);
        let pop: Vec<u8> = (1..=33).collect();
        let weights = vec![1.0; 33];
        let picked = weighted_sample_without_replacement(&pop, &weights, 6, &mut rng);
        assert_eq!(picked.len(), 6);
        assert!(picked.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_zero_weights_picked_last() {
        let mut rng = StdRng::seed_from_u64(1);
        let pop: Vec<u8> = (1..=10).collect();
        let mut weights = vec![0.0; 10];
        weights[2] = 1.0;
        weights[7] = 1.0;
        for _ in 0..50 {
            let picked = weighted_sample_without_replacement(&pop, &weights, 2, &mut rng);
            assert_eq!(picked, vec![3, 8]);
        }
    }

    #[test]
    fn test_k_larger_than_population() {
        let mut rng = StdRng::seed_from_u64(3);
        let picked = weighted_sample_without_replacement(&[4, 2, 9], &[1.0, 1.0, 1.0], 5, &mut rng);
        assert_eq!(picked, vec![2, 4, 9]);
    }

    #[test]
    fn test_heavy_weight_dominates() {
        let mut rng = StdRng::seed_from_u64(42);
        let pop: Vec<u8> = (1..=5).collect();
        let weights = [1000.0, 0.01, 0.01, 0.01, 0.01];
        let hits = (0..200)
            .filter(|_| weighted_sample_without_replacement(&pop, &weights, 1, &mut rng) == vec![1])
            .count();
        assert!(hits > 190, "heavy item picked only {} times", hits);
    }

    #[test]
    fn test_same_seed_same_sample() {
        let pop: Vec<u8> = (1..=16).collect();
        let weights: Vec<f64> = (1..=16).map(|w| w as f64).collect();
        let a = weighted_sample_without_replacement(&pop, &weights, 3, &mut StdRng::seed_from_u64(99));
        let b = weighted_sample_without_replacement(&pop, &weights, 3, &mut StdRng::seed_from_u64(99));
        assert_eq!(a, b);
    }
}
