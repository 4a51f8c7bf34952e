//! Bin level monitor.
//!
//! Runs on **every telemetry update**, independently of the session
//! workflow; it keeps updating while the session is paused for actuation.
//!
//! ## Full-bin lifecycle
//!
//! 1. A telemetry snapshot arrives; each percentage is clamped to 0–100.
//! 2. The monitor recomputes the full-bin bitmask from scratch.
//! 3. If the mask is non-zero, a `BinFull` alert is raised **on this
//!    update**, whether or not it was already full last time
//!    (level-triggered).  The alert surface expires it after its dwell.
//! 4. The tier of each bin is always available for display and never
//!    expires.

use log::{info, warn};

use crate::alerts::{AlertKind, AlertSurface};

/// Discretised fill status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BinTier {
    Empty,
    Low,
    HalfFull,
    AlmostFull,
    Full,
}

impl BinTier {
    pub fn label(self) -> &'static str {
        match self {
            Self::Empty => "EMPTY",
            Self::Low => "LOW LEVEL",
            Self::HalfFull => "HALF FULL",
            Self::AlmostFull => "ALMOST FULL",
            Self::Full => "FULL",
        }
    }
}

/// Map a fill percentage onto its tier.
pub fn tier(pct: f32) -> BinTier {
    if pct >= 100.0 {
        BinTier::Full
    } else if pct >= 90.0 {
        BinTier::AlmostFull
    } else if pct >= 60.0 {
        BinTier::HalfFull
    } else if pct >= 30.0 {
        BinTier::Low
    } else {
        BinTier::Empty
    }
}

/// Physical bins that report a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Bin {
    Syringe = 0b001,
    Hazardous = 0b010,
    NonHazardous = 0b100,
}

impl Bin {
    pub const ALL: [Bin; 3] = [Bin::Syringe, Bin::Hazardous, Bin::NonHazardous];

    pub const fn mask(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Syringe => "SYRINGE",
            Self::Hazardous => "HAZARDOUS WASTE",
            Self::NonHazardous => "NON-HAZARDOUS WASTE",
        }
    }
}

/// Latest fill percentages, each in `[0, 100]`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BinLevelSnapshot {
    pub syringe_pct: f32,
    pub hazardous_pct: f32,
    pub non_hazardous_pct: f32,
}

impl BinLevelSnapshot {
    /// Build a snapshot, clamping every value into range.  NaN reads as empty.
    pub fn clamped(syringe_pct: f32, hazardous_pct: f32, non_hazardous_pct: f32) -> Self {
        Self {
            syringe_pct: clamp_pct(syringe_pct),
            hazardous_pct: clamp_pct(hazardous_pct),
            non_hazardous_pct: clamp_pct(non_hazardous_pct),
        }
    }

    pub fn level(&self, bin: Bin) -> f32 {
        match bin {
            Bin::Syringe => self.syringe_pct,
            Bin::Hazardous => self.hazardous_pct,
            Bin::NonHazardous => self.non_hazardous_pct,
        }
    }
}

fn clamp_pct(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 100.0) }
}

/// Convert an ultrasonic distance reading into a fill percentage.
///
/// `height_cm` is the distance to an empty bin's floor; anything at or
/// below `full_cm` is a full bin.
pub fn distance_to_percentage(distance_cm: f32, height_cm: f32, full_cm: f32) -> f32 {
    if distance_cm <= full_cm {
        return 100.0;
    }
    if distance_cm >= height_cm {
        return 0.0;
    }
    let pct = (1.0 - (distance_cm - full_cm) / (height_cm - full_cm)) * 100.0;
    // One decimal place, matching what the sensor bridge reports.
    (pct.clamp(0.0, 100.0) * 10.0).round() / 10.0
}

/// Raw per-bin values as they arrive on the wire.  Any field may be missing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryReading {
    pub syringe_pct: Option<f32>,
    pub hazardous_pct: Option<f32>,
    pub non_hazardous_pct: Option<f32>,
    pub syringe_cm: Option<f32>,
    pub hazardous_cm: Option<f32>,
    pub non_hazardous_cm: Option<f32>,
}

/// Bin level monitor.
pub struct BinLevelMonitor {
    height_cm: f32,
    full_cm: f32,
    snapshot: BinLevelSnapshot,
    /// Bins that were full on the latest update.
    full_mask: u8,
}

impl BinLevelMonitor {
    pub fn new(height_cm: f32, full_cm: f32) -> Self {
        Self {
            height_cm,
            full_cm,
            snapshot: BinLevelSnapshot::default(),
            full_mask: 0,
        }
    }

    /// Replace the snapshot with `reading` (last write wins) and raise a
    /// `BinFull` alert if any bin is full.  Returns the new full-bin mask.
    pub fn apply(&mut self, reading: &TelemetryReading, now_ms: u64, alerts: &mut AlertSurface) -> u8 {
        let (height, full) = (self.height_cm, self.full_cm);
        let pick = |pct: Option<f32>, cm: Option<f32>| {
            pct.or_else(|| cm.map(|d| distance_to_percentage(d, height, full)))
                .unwrap_or(0.0)
        };
        self.snapshot = BinLevelSnapshot::clamped(
            pick(reading.syringe_pct, reading.syringe_cm),
            pick(reading.hazardous_pct, reading.hazardous_cm),
            pick(reading.non_hazardous_pct, reading.non_hazardous_cm),
        );

        let previous = self.full_mask;
        self.full_mask = Bin::ALL
            .iter()
            .filter(|b| tier(self.snapshot.level(**b)) == BinTier::Full)
            .fold(0, |mask, b| mask | b.mask());

        for bin in Bin::ALL {
            let now_full = self.full_mask & bin.mask() != 0;
            let was_full = previous & bin.mask() != 0;
            if now_full && !was_full {
                warn!("BIN | {} is FULL", bin.label());
            } else if was_full && !now_full {
                info!("BIN | {} emptied", bin.label());
            }
        }

        if self.full_mask != 0 {
            alerts.raise(
                AlertKind::BinFull,
                "BIN IS FULL - IMMEDIATE DISPOSAL REQUIRED",
                now_ms,
            );
        }
        self.full_mask
    }

    /// Change the distance geometry used for readings without percentages.
    pub fn set_geometry(&mut self, height_cm: f32, full_cm: f32) {
        self.height_cm = height_cm;
        self.full_cm = full_cm;
    }

    pub fn snapshot(&self) -> BinLevelSnapshot {
        self.snapshot
    }

    pub fn tier_of(&self, bin: Bin) -> BinTier {
        tier(self.snapshot.level(bin))
    }

    pub fn is_full(&self, bin: Bin) -> bool {
        self.full_mask & bin.mask() != 0
    }

    pub fn has_full_bin(&self) -> bool {
        self.full_mask != 0
    }
}
