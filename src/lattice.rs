//! The termination lattice: a four-valued verdict, the explanation that
//! accompanies it, and the two combinators (`join`, `update`) the rest of
//! the crate is built on.
//!
//! # Laws
//!
//! - [`join`] is commutative and associative, with [`Verdict::Unevaluated`]
//!   as its identity.
//! - [`update`] is [`join`] plus one asymmetric rule: a node every one of
//!   whose incoming edges is `Unbounded` is itself `Unbounded`, even if its
//!   own local content is `Bounded`.
//!
//! Both are monotone with respect to [`Verdict`]'s total order, which is
//! what guarantees the worklists in [`crate::function`] and
//! [`crate::module`] converge.

use std::fmt;

/// The four-valued termination verdict.
///
/// Ordered bottom to top: [`Unevaluated`](Verdict::Unevaluated) <
/// [`Bounded`](Verdict::Bounded) < [`Unbounded`](Verdict::Unbounded) <
/// [`Unknown`](Verdict::Unknown). This total order exists only to make
/// `min`/`max` deterministic for explanation bookkeeping in [`join`]; it is
/// not itself the lattice join (see the table on [`join`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Verdict {
    /// Bottom: no information yet. Identity element for [`join`].
    Unevaluated,
    /// Provably terminates in statically bounded steps.
    Bounded,
    /// Provably does not terminate (an infinite loop with no exit, reachable
    /// unconditionally).
    Unbounded,
    /// Cannot be decided: includes divergence mixed with termination on
    /// different control paths, or the analyzer otherwise gave up.
    Unknown,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Unevaluated => "Unevaluated",
            Verdict::Bounded => "Bounded",
            Verdict::Unbounded => "Unbounded",
            Verdict::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// A verdict paired with a human-readable explanation of why it was
/// reached.
///
/// `Outcome`s are ordered lexicographically by `(verdict, explanation)`
/// purely to make `min`/`max` total and deterministic when [`join`] has to
/// pick a tie-break; the semantic lattice join is [`join`] itself, not this
/// ordering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, derive_more::Display)]
#[display("{verdict}: {explanation}")]
pub struct Outcome {
    /// The verdict.
    pub verdict: Verdict,
    /// Free-form explanation of why this verdict was chosen.
    pub explanation: String,
}

impl Outcome {
    /// Creates an outcome with the given verdict and explanation.
    #[must_use]
    pub fn new(verdict: Verdict, explanation: impl Into<String>) -> Self {
        Self {
            verdict,
            explanation: explanation.into(),
        }
    }

    /// The bottom outcome: [`Verdict::Unevaluated`] with no explanation.
    #[must_use]
    pub fn unevaluated() -> Self {
        Self::new(Verdict::Unevaluated, "")
    }

    /// A `Bounded` outcome with the given explanation.
    #[must_use]
    pub fn bounded(explanation: impl Into<String>) -> Self {
        Self::new(Verdict::Bounded, explanation)
    }

    /// An `Unbounded` outcome with the given explanation.
    #[must_use]
    pub fn unbounded(explanation: impl Into<String>) -> Self {
        Self::new(Verdict::Unbounded, explanation)
    }

    /// An `Unknown` outcome with the given explanation.
    #[must_use]
    pub fn unknown(explanation: impl Into<String>) -> Self {
        Self::new(Verdict::Unknown, explanation)
    }
}

/// Computes the join (least upper bound) of two outcomes.
///
/// Commutative and associative, with [`Verdict::Unevaluated`] as identity.
///
/// | lo | hi | join |
/// |---|---|---|
/// | `Unevaluated` | any `x` | `x` |
/// | `Bounded` | `Bounded` | `Bounded` |
/// | `Bounded` | `Unbounded` | `Unknown` |
/// | `Bounded` | `Unknown` | `Unknown` |
/// | `Unbounded` | `Unbounded` | `Unbounded` |
/// | `Unbounded` | `Unknown` | `Unknown` |
/// | `Unknown` | `Unknown` | `Unknown` |
///
/// `join(Bounded, Unbounded) = Unknown` rather than `Unbounded`: two
/// *sibling* branches where one terminates and the other does not mean
/// execution may reach either, so the analyzer cannot assert
/// non-termination of the joined point.
#[must_use]
#[instability::unstable(feature = "lattice-internals")]
pub fn join(a: Outcome, b: Outcome) -> Outcome {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    match (lo.verdict, hi.verdict) {
        (Verdict::Unevaluated, _) => hi,
        (Verdict::Bounded, Verdict::Bounded) => hi,
        (Verdict::Bounded, Verdict::Unbounded) => {
            Outcome::unknown(format!("Joined with Unbounded branch: {}", hi.explanation))
        }
        (Verdict::Bounded, Verdict::Unknown) => hi,
        (Verdict::Unbounded, Verdict::Unbounded) => Outcome::unbounded(format!(
            "Joined two Unbounded branches: ({}), ({})",
            lo.explanation, hi.explanation
        )),
        (Verdict::Unbounded, Verdict::Unknown) => hi,
        (Verdict::Unknown, Verdict::Unknown) => hi,
        // lo <= hi under the total order makes every other pairing
        // unreachable (e.g. (Unknown, Bounded) can't occur since Bounded <
        // Unknown would put Bounded first).
        _ => unreachable!("lo <= hi by construction"),
    }
}

/// Folds a set of predecessor/successor outcomes into `self`'s current
/// outcome.
///
/// First reduces `incoming` to a single aggregate via repeated [`join`].
/// Then:
///
/// - If `self.verdict == Bounded` **and** `agg.verdict == Unbounded`,
///   returns `agg` verbatim. This is the one asymmetric rule in the whole
///   lattice: a node all of whose incoming edges are on a provably
///   diverging path is itself on a diverging path, even though its own
///   local content is bounded, because it is never reached from a
///   terminating prefix.
/// - Otherwise returns `join(self, agg)`.
///
/// `update(self, [])` is a no-op: joining with nothing yields `self` back
/// (since `Unevaluated` is `join`'s identity).
#[must_use]
#[instability::unstable(feature = "lattice-internals")]
pub fn update(current: Outcome, incoming: impl IntoIterator<Item = Outcome>) -> Outcome {
    let agg = incoming
        .into_iter()
        .fold(Outcome::unevaluated(), |acc, next| join(acc, next));

    if current.verdict == Verdict::Bounded && agg.verdict == Verdict::Unbounded {
        agg
    } else {
        join(current, agg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_verdict() -> impl Strategy<Value = Verdict> {
        prop_oneof![
            Just(Verdict::Unevaluated),
            Just(Verdict::Bounded),
            Just(Verdict::Unbounded),
            Just(Verdict::Unknown),
        ]
    }

    fn arb_outcome() -> impl Strategy<Value = Outcome> {
        (arb_verdict(), "[a-z]{0,8}").prop_map(|(verdict, explanation)| Outcome {
            verdict,
            explanation,
        })
    }

    #[test]
    fn update_empty_is_noop() {
        let a = Outcome::bounded("x");
        assert_eq!(update(a.clone(), vec![]), a);
    }

    #[test]
    fn update_asymmetric_rule() {
        let result = update(Outcome::bounded("self"), vec![Outcome::unbounded("pred")]);
        assert_eq!(result.verdict, Verdict::Unbounded);
    }

    #[test]
    fn update_sibling_divergence() {
        let result = update(
            Outcome::unevaluated(),
            vec![Outcome::bounded("a"), Outcome::unbounded("b")],
        );
        assert_eq!(result.verdict, Verdict::Unknown);
    }

    proptest! {
        #[test]
        fn join_is_commutative(a in arb_outcome(), b in arb_outcome()) {
            prop_assert_eq!(join(a.clone(), b.clone()).verdict, join(b, a).verdict);
        }

        #[test]
        fn join_is_associative(a in arb_outcome(), b in arb_outcome(), c in arb_outcome()) {
            let lhs = join(join(a.clone(), b.clone()), c.clone());
            let rhs = join(a, join(b, c));
            prop_assert_eq!(lhs.verdict, rhs.verdict);
        }

        #[test]
        fn unevaluated_is_identity(a in arb_outcome()) {
            prop_assert_eq!(join(Outcome::unevaluated(), a.clone()).verdict, a.verdict);
        }

        #[test]
        fn join_is_monotone_in_first_argument(a in arb_verdict(), b in arb_outcome()) {
            // Any outcome with a strictly greater verdict than `a` joined with `b`
            // should not produce a strictly smaller verdict than `join(a, b)`.
            let a_outcome = Outcome::new(a, "a");
            let bumped = match a {
                Verdict::Unevaluated => Verdict::Bounded,
                Verdict::Bounded => Verdict::Unbounded,
                Verdict::Unbounded | Verdict::Unknown => Verdict::Unknown,
            };
            let bumped_outcome = Outcome::new(bumped, "bumped");
            prop_assert!(join(a_outcome, b.clone()).verdict <= join(bumped_outcome, b).verdict);
        }
    }
}
