use std::cmp::Ordering;

use common::ActorId;

use crate::funnel::attempt::FunnelAttempt;
use crate::funnel::breakdown::BreakdownKey;

/// The one attempt that represents an actor in the aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorResult {
    pub actor: ActorId,
    pub attempt: FunnelAttempt,
    pub breakdown: Option<BreakdownKey>,
}

// deeper first, then earlier start, then shorter
fn rank(a: &FunnelAttempt, b: &FunnelAttempt) -> Ordering {
    b.depth()
        .cmp(&a.depth())
        .then_with(|| a.start().cmp(&b.start()))
        .then_with(|| a.last_ts().cmp(&b.last_ts()))
        .then_with(|| {
            let left = a.steps().iter().map(|s| (s.ts, s.row_id, s.step));
            let right = b.steps().iter().map(|s| (s.ts, s.row_id, s.step));
            left.cmp(right)
        })
}

/// Picks the best attempt. The result does not depend on the input order.
pub fn select(attempts: Vec<FunnelAttempt>) -> Option<FunnelAttempt> {
    attempts.into_iter().min_by(rank)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    use super::*;
    use crate::funnel::attempt::Step;

    fn attempt(steps: &[(usize, i64)]) -> FunnelAttempt {
        FunnelAttempt::new(
            steps
                .iter()
                .map(|(step, ts)| Step {
                    step: *step,
                    ts: *ts,
                    row_id: *ts as usize,
                })
                .collect(),
        )
    }

    #[test]
    fn test_select() {
        struct TestCase {
            name: &'static str,
            attempts: Vec<FunnelAttempt>,
            exp: Option<FunnelAttempt>,
        }

        let cases = vec![
            TestCase {
                name: "nothing",
                attempts: vec![],
                exp: None,
            },
            TestCase {
                name: "deepest wins",
                attempts: vec![
                    attempt(&[(0, 1), (1, 2)]),
                    attempt(&[(0, 3), (1, 4), (2, 5)]),
                ],
                exp: Some(attempt(&[(0, 3), (1, 4), (2, 5)])),
            },
            TestCase {
                name: "earliest start on equal depth",
                attempts: vec![attempt(&[(0, 5), (1, 6)]), attempt(&[(0, 1), (1, 9)])],
                exp: Some(attempt(&[(0, 1), (1, 9)])),
            },
            TestCase {
                name: "earliest last step on equal start",
                attempts: vec![attempt(&[(0, 1), (1, 9)]), attempt(&[(0, 1), (1, 4)])],
                exp: Some(attempt(&[(0, 1), (1, 4)])),
            },
        ];

        for case in cases {
            assert_eq!(select(case.attempts), case.exp, "case: {}", case.name);
        }
    }

    #[test]
    fn test_select_is_order_independent() {
        let attempts = vec![
            attempt(&[(0, 1), (1, 5)]),
            attempt(&[(0, 1), (1, 3)]),
            attempt(&[(0, 2), (1, 3)]),
            attempt(&[(0, 0)]),
            attempt(&[(0, 1), (1, 3)]),
        ];
        let exp = select(attempts.clone());
        assert_eq!(exp, Some(attempt(&[(0, 1), (1, 3)])));

        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..20 {
            let mut shuffled = attempts.clone();
            shuffled.shuffle(&mut rng);
            assert_eq!(select(shuffled), exp);
        }
    }
}
