//! Minimal time units and strongly-typed durations/timestamps.
use core::fmt;
use core::marker::PhantomData;

/// Marker trait for a time unit.
pub trait TimeUnit {
    /// Unit suffix used by the `Display` impls.
    const NAME: &'static str;
    /// Length of one unit in microseconds.
    const MICROS: u64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Micros {}
impl TimeUnit for Micros {
    const NAME: &'static str = "us";
    const MICROS: u64 = 1;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Millis {}
impl TimeUnit for Millis {
    const NAME: &'static str = "ms";
    const MICROS: u64 = 1_000;
}

/// Strongly-typed duration in a given unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Duration<U: TimeUnit>(u64, PhantomData<U>);

/// Strongly-typed point on a monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Timestamp<U: TimeUnit>(u64, PhantomData<U>);

impl<U: TimeUnit> Duration<U> {
    /// Create a new duration.
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value, PhantomData)
    }

    /// Return the raw value.
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Converts to microseconds, saturating on overflow.
    #[inline]
    pub const fn to_micros(self) -> Duration<Micros> {
        Duration::new(self.0.saturating_mul(U::MICROS))
    }
}

impl Duration<Micros> {
    #[inline]
    pub const fn from_micros(value: u64) -> Self {
        Self::new(value)
    }
}

impl Duration<Millis> {
    /// Convenience constructor for milliseconds.
    #[inline]
    pub const fn from_millis(value: u64) -> Self {
        Self::new(value)
    }
}

impl<U: TimeUnit> Timestamp<U> {
    /// Create a new timestamp.
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value, PhantomData)
    }

    /// Return the raw value.
    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    #[inline]
    pub const fn saturating_since(self, earlier: Self) -> Duration<U> {
        Duration::new(self.0.saturating_sub(earlier.0))
    }
}

impl<U: TimeUnit> core::ops::Add<Duration<U>> for Timestamp<U> {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Duration<U>) -> Self::Output {
        Timestamp::new(self.0.saturating_add(rhs.0))
    }
}

impl<U: TimeUnit> fmt::Display for Duration<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.0, U::NAME)
    }
}

impl<U: TimeUnit> fmt::Display for Timestamp<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}{}", self.0, U::NAME)
    }
}
