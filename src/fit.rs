//! Placement policies shared by both allocator variants.

use core::fmt;
use core::str::FromStr;

use crate::AllocError;

/// A free extent offered to a [`FitMode`] as a placement candidate.
pub trait Extent {
    /// Extent length in bytes.
    fn size(&self) -> usize;
}

/// Policy used to choose among the free extents able to hold a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum FitMode {
    /// First extent large enough, in the allocator's walk order.
    #[default]
    FirstFit = 0,
    /// Extent leaving the least slack; an exact match stops the walk.
    BestFit = 1,
    /// Largest extent.
    WorstFit = 2,
}

impl FitMode {
    pub const ALL: [FitMode; 3] = [FitMode::FirstFit, FitMode::BestFit, FitMode::WorstFit];

    /// Choose a candidate of at least `required` bytes.
    ///
    /// `candidates` is consumed lazily: first-fit and an exact best-fit
    /// match stop pulling from it early. Ties go to the earliest candidate.
    pub fn select<E, I>(self, candidates: I, required: usize) -> Option<E>
    where
        E: Extent,
        I: IntoIterator<Item = E>,
    {
        let mut fitting = candidates.into_iter().filter(|c| c.size() >= required);
        match self {
            FitMode::FirstFit => fitting.next(),
            FitMode::BestFit => {
                let mut best: Option<E> = None;
                for candidate in fitting {
                    if candidate.size() == required {
                        return Some(candidate);
                    }
                    if best.as_ref().map_or(true, |b| candidate.size() < b.size()) {
                        best = Some(candidate);
                    }
                }
                best
            }
            FitMode::WorstFit => {
                let mut worst: Option<E> = None;
                for candidate in fitting {
                    if worst.as_ref().map_or(true, |w| candidate.size() > w.size()) {
                        worst = Some(candidate);
                    }
                }
                worst
            }
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            FitMode::FirstFit => "first_fit",
            FitMode::BestFit => "best_fit",
            FitMode::WorstFit => "worst_fit",
        }
    }
}

impl fmt::Display for FitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<u8> for FitMode {
    type Error = AllocError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FitMode::FirstFit),
            1 => Ok(FitMode::BestFit),
            2 => Ok(FitMode::WorstFit),
            _ => Err(AllocError::InvalidParam),
        }
    }
}

impl FromStr for FitMode {
    type Err = AllocError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" | "first_fit" => Ok(FitMode::FirstFit),
            "best" | "best_fit" | "the_best_fit" => Ok(FitMode::BestFit),
            "worst" | "worst_fit" | "the_worst_fit" => Ok(FitMode::WorstFit),
            _ => Err(AllocError::InvalidParam),
        }
    }
}
