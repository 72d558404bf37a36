use super::*;

// ── LinearTrendAccumulator ────────────────────────────────────────────────────

/// Streaming least-squares fit of `y` against `x`.
///
/// Keeps exact integer sums so the slope is independent of fold order.
/// Sums are widened to `i128`; an overflow makes the slope `NaN` rather
/// than wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinearTrendAccumulator {
    count: i128,
    sum_x: i128,
    sum_y: i128,
    sum_xx: i128,
    sum_xy: i128,
    /// Set once any running sum overflowed. Sticky.
    overflowed: bool,
}

impl LinearTrendAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one `(x, y)` sample.
    pub fn accumulate(&mut self, x: i64, y: i64) {
        self.count += 1;
        if self.overflowed {
            return;
        }
        let (x, y) = (x as i128, y as i128);
        // i64 products always fit in i128; only the sums can overflow.
        let sums = (|| {
            Some((
                self.sum_x.checked_add(x)?,
                self.sum_y.checked_add(y)?,
                self.sum_xx.checked_add(x * x)?,
                self.sum_xy.checked_add(x * y)?,
            ))
        })();
        match sums {
            Some((sum_x, sum_y, sum_xx, sum_xy)) => {
                self.sum_x = sum_x;
                self.sum_y = sum_y;
                self.sum_xx = sum_xx;
                self.sum_xy = sum_xy;
            }
            None => self.overflowed = true,
        }
    }

    pub fn has_overflowed(&self) -> bool {
        self.overflowed
    }

    pub fn count(&self) -> u64 {
        self.count as u64
    }

    /// `(n·Σxy − Σx·Σy) / (n·Σx² − (Σx)²)`, or `NaN` when the denominator is
    /// zero (no samples, or every sample at the same `x`) or a sum overflowed.
    pub fn slope(&self) -> f64 {
        if self.overflowed {
            return f64::NAN;
        }
        let terms = || -> Option<(i128, i128)> {
            let numerator = self
                .count
                .checked_mul(self.sum_xy)?
                .checked_sub(self.sum_x.checked_mul(self.sum_y)?)?;
            let denominator = self
                .count
                .checked_mul(self.sum_xx)?
                .checked_sub(self.sum_x.checked_mul(self.sum_x)?)?;
            Some((numerator, denominator))
        };
        match terms() {
            Some((_, 0)) | None => f64::NAN,
            Some((numerator, denominator)) => numerator as f64 / denominator as f64,
        }
    }
}

// ── AggregateKind ─────────────────────────────────────────────────────────────

/// Extracts an integer coordinate from an item.
pub type LongExtractor<T> = fn(&T) -> i64;
/// Extracts a floating point value from an item.
pub type DoubleExtractor<T> = fn(&T) -> f64;
/// Orders two items.
pub type Comparator<T> = fn(&T, &T) -> Ordering;

/// The closed set of window aggregations.
#[derive(Debug, Clone)]
pub enum AggregateKind<T> {
    /// Collect every item in arrival order.
    ToList,
    /// Least-squares slope of `y(item)` over `x(item)`.
    LinearTrend {
        x: LongExtractor<T>,
        y: LongExtractor<T>,
    },
    /// Keep the greatest item; ties keep the earlier one.
    MaxBy(Comparator<T>),
    /// Sum of a floating point value.
    Summing(DoubleExtractor<T>),
    /// Run two aggregations side by side over the same items.
    AllOf(Box<AggregateKind<T>>, Box<AggregateKind<T>>),
}

impl<T: Clone> AggregateKind<T> {
    pub fn to_list() -> Self {
        Self::ToList
    }

    pub fn linear_trend(x: LongExtractor<T>, y: LongExtractor<T>) -> Self {
        Self::LinearTrend { x, y }
    }

    pub fn max_by(comparator: Comparator<T>) -> Self {
        Self::MaxBy(comparator)
    }

    pub fn summing(value: DoubleExtractor<T>) -> Self {
        Self::Summing(value)
    }

    pub fn all_of(first: AggregateKind<T>, second: AggregateKind<T>) -> Self {
        Self::AllOf(Box::new(first), Box::new(second))
    }

    /// Create a fresh accumulator for a new window.
    pub fn create_accumulator(&self) -> Accumulator<T> {
        match self {
            Self::ToList => Accumulator::List(Vec::new()),
            Self::LinearTrend { x, y } => Accumulator::LinearTrend {
                x: *x,
                y: *y,
                trend: LinearTrendAccumulator::new(),
            },
            Self::MaxBy(comparator) => Accumulator::MaxBy {
                comparator: *comparator,
                max: None,
            },
            Self::Summing(value) => Accumulator::Summing {
                value: *value,
                sum: 0.0,
            },
            Self::AllOf(first, second) => Accumulator::AllOf(
                Box::new(first.create_accumulator()),
                Box::new(second.create_accumulator()),
            ),
        }
    }
}

// ── Accumulator ───────────────────────────────────────────────────────────────

/// Mutable per-window state for one [`AggregateKind`].
#[derive(Debug, Clone)]
pub enum Accumulator<T> {
    List(Vec<T>),
    LinearTrend {
        x: LongExtractor<T>,
        y: LongExtractor<T>,
        trend: LinearTrendAccumulator,
    },
    MaxBy {
        comparator: Comparator<T>,
        max: Option<T>,
    },
    Summing {
        value: DoubleExtractor<T>,
        sum: f64,
    },
    AllOf(Box<Accumulator<T>>, Box<Accumulator<T>>),
}

impl<T: Clone> Accumulator<T> {
    /// Fold one item into the accumulator.
    pub fn accumulate(&mut self, item: &T) {
        match self {
            Self::List(items) => items.push(item.clone()),
            Self::LinearTrend { x, y, trend } => trend.accumulate((*x)(item), (*y)(item)),
            Self::MaxBy { comparator, max } => {
                let replace = match max {
                    Some(current) => (*comparator)(item, current) == Ordering::Greater,
                    None => true,
                };
                if replace {
                    *max = Some(item.clone());
                }
            }
            Self::Summing { value, sum } => *sum += (*value)(item),
            Self::AllOf(first, second) => {
                first.accumulate(item);
                second.accumulate(item);
            }
        }
    }

    /// Produce the final value of this window.
    pub fn finish(self) -> AggregateValue<T> {
        match self {
            Self::List(items) => AggregateValue::List(items),
            Self::LinearTrend { trend, .. } => AggregateValue::Slope(trend.slope()),
            Self::MaxBy { max, .. } => AggregateValue::Max(max),
            Self::Summing { sum, .. } => AggregateValue::Sum(sum),
            Self::AllOf(first, second) => {
                AggregateValue::Pair(Box::new(first.finish()), Box::new(second.finish()))
            }
        }
    }
}

// ── AggregateValue ────────────────────────────────────────────────────────────

/// Result of finishing an [`Accumulator`].
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateValue<T> {
    List(Vec<T>),
    Slope(f64),
    Max(Option<T>),
    Sum(f64),
    Pair(Box<AggregateValue<T>>, Box<AggregateValue<T>>),
}

impl<T> AggregateValue<T> {
    pub fn into_list(self) -> Option<Vec<T>> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_slope(self) -> Option<f64> {
        match self {
            Self::Slope(slope) => Some(slope),
            _ => None,
        }
    }

    /// The maximum item, or `None` for an empty window or another kind.
    pub fn into_max(self) -> Option<T> {
        match self {
            Self::Max(max) => max,
            _ => None,
        }
    }

    pub fn into_sum(self) -> Option<f64> {
        match self {
            Self::Sum(sum) => Some(sum),
            _ => None,
        }
    }

    pub fn into_pair(self) -> Option<(AggregateValue<T>, AggregateValue<T>)> {
        match self {
            Self::Pair(first, second) => Some((*first, *second)),
            _ => None,
        }
    }
}
