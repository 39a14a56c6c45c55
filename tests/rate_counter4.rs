use std::time::Duration;

use proptest::prelude::*;
use rate_counter_core::{Accumulator, CancellationToken, RateCounter};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn rate_is_sum_of_deltas_without_elapsed_time(
        deltas in prop::collection::vec(-1_000i64..1_000, 0..200),
        resolution in 1usize..64,
    ) {
        let token = CancellationToken::new();
        let counter = RateCounter::new(token.clone(), Duration::from_secs(3600))
            .with_resolution(resolution);

        let mut expected = 0i64;
        for delta in deltas {
            counter.incr(delta);
            expected += delta;
            prop_assert_eq!(counter.rate(), expected);
        }

        token.cancel();
    }

    #[test]
    fn accumulator_wraps_on_overflow(deltas in prop::collection::vec(any::<i64>(), 0..50)) {
        let acc = Accumulator::new();
        let expected = deltas.iter().fold(0i64, |sum, d| sum.wrapping_add(*d));
        for delta in deltas {
            acc.add(delta);
        }
        prop_assert_eq!(acc.value(), expected);
        prop_assert_eq!(acc.take(), expected);
        prop_assert_eq!(acc.value(), 0);
    }
}
