//! Parameter-tracking value lattice.
//!
//! A [`ParamsValue`] records which formal parameters may have flowed into a
//! local slot or operand-stack entry. The parameter set has two
//! representations behind [`ParamSet`]: a packed machine word for the common
//! small-arity case and a boolean array for everything else.

use std::fmt;

/// A set of formal-parameter indices in `0..arity`.
///
/// Implementations are interchangeable: every analysis result must be the
/// same whichever one is chosen.
pub trait ParamSet: Clone + PartialEq + Eq + fmt::Debug + Send + Sync + 'static {
    /// Largest arity this representation can hold.
    const CAPACITY: usize;

    fn empty(arity: usize) -> Self;

    fn single(arity: usize, index: usize) -> Self {
        let mut set = Self::empty(arity);
        set.insert(index);
        set
    }

    fn insert(&mut self, index: usize);

    /// Removes every index, keeping the arity.
    fn clear(&mut self);

    fn contains(&self, index: usize) -> bool;

    fn is_empty(&self) -> bool;

    /// In-place union; returns whether `self` grew.
    fn union_with(&mut self, other: &Self) -> bool;

    fn union(&self, other: &Self) -> Self {
        let mut out = self.clone();
        out.union_with(other);
        out
    }

    fn to_bools(&self, arity: usize) -> Vec<bool> {
        (0..arity).map(|i| self.contains(i)).collect()
    }
}

/// Parameter set packed into one `u32`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PackedParams(u32);

impl ParamSet for PackedParams {
    const CAPACITY: usize = u32::BITS as usize;

    fn empty(arity: usize) -> Self {
        debug_assert!(arity <= Self::CAPACITY);
        PackedParams(0)
    }

    fn insert(&mut self, index: usize) {
        debug_assert!(index < Self::CAPACITY);
        self.0 |= 1 << index;
    }

    fn clear(&mut self) {
        self.0 = 0;
    }

    fn contains(&self, index: usize) -> bool {
        index < Self::CAPACITY && self.0 & (1 << index) != 0
    }

    fn is_empty(&self) -> bool {
        self.0 == 0
    }

    fn union_with(&mut self, other: &Self) -> bool {
        let before = self.0;
        self.0 |= other.0;
        self.0 != before
    }
}

impl fmt::Debug for PackedParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for i in (0..Self::CAPACITY).filter(|&i| self.contains(i)) {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "{i}")?;
        }
        write!(f, "}}")
    }
}

/// Parameter set for any arity, one flag per parameter.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct WideParams(Box<[bool]>);

impl ParamSet for WideParams {
    const CAPACITY: usize = usize::MAX;

    fn empty(arity: usize) -> Self {
        WideParams(vec![false; arity].into_boxed_slice())
    }

    fn insert(&mut self, index: usize) {
        self.0[index] = true;
    }

    fn clear(&mut self) {
        self.0.iter_mut().for_each(|b| *b = false);
    }

    fn contains(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    fn is_empty(&self) -> bool {
        !self.0.iter().any(|&b| b)
    }

    fn union_with(&mut self, other: &Self) -> bool {
        debug_assert_eq!(self.0.len(), other.0.len());
        let mut grew = false;
        for (slot, &theirs) in self.0.iter_mut().zip(other.0.iter()) {
            if theirs && !*slot {
                *slot = true;
                grew = true;
            }
        }
        grew
    }

    fn to_bools(&self, arity: usize) -> Vec<bool> {
        let mut out = self.0.to_vec();
        out.resize(arity, false);
        out
    }
}

impl fmt::Debug for WideParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.0.iter().enumerate().filter(|&(_, &b)| b).map(|(i, _)| i))
            .finish()
    }
}

/// Abstract value of one local slot or stack entry.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ParamsValue<S> {
    pub params: S,
    size: u8,
}

impl<S: ParamSet> ParamsValue<S> {
    /// A value not derived from any formal parameter.
    #[must_use]
    pub fn untracked(arity: usize, size: u8) -> Self {
        debug_assert!(matches!(size, 1 | 2));
        Self {
            params: S::empty(arity),
            size,
        }
    }

    /// The incoming value of reference parameter `index`.
    #[must_use]
    pub fn parameter(arity: usize, index: usize) -> Self {
        Self {
            params: S::single(arity, index),
            size: 1,
        }
    }

    #[must_use]
    pub fn with_params(params: S, size: u8) -> Self {
        debug_assert!(matches!(size, 1 | 2));
        Self { params, size }
    }

    /// Word width: 2 for `long`/`double`, 1 otherwise.
    #[must_use]
    pub fn width(&self) -> u8 {
        self.size
    }

    /// Lattice join.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        if self == other {
            return self.clone();
        }
        Self {
            params: self.params.union(&other.params),
            size: self.size.min(other.size),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for ParamsValue<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{}", self.params, self.size)
    }
}
