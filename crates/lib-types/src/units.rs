//! Physical units with type safety.
//!
//! These newtypes keep the quantities that flow from an IBIS model into a
//! SPICE subcircuit apart (a fixture resistance cannot be added to a die
//! capacitance by accident). IBIS files are already in base SI units, so the
//! wrapped value is always volts, ohms, seconds, farads or henries.

use serde::{Deserialize, Serialize};
use std::ops::{Div, Sub};

/// Time in seconds.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Seconds(pub f64);

impl Seconds {
    pub const ZERO: Self = Self(0.0);

    #[inline]
    pub fn from_ns(ns: f64) -> Self {
        Self(ns * 1e-9)
    }

    #[inline]
    pub fn as_ns(&self) -> f64 {
        self.0 * 1e9
    }
}

/// Voltage in Volts.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Volts(pub f64);

impl Volts {
    pub const ZERO: Self = Self(0.0);
}

impl Sub for Volts {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

/// Ohm's law: a voltage across a resistance gives a current in amperes.
impl Div<Ohms> for Volts {
    type Output = f64;
    fn div(self, rhs: Ohms) -> f64 {
        self.0 / rhs.0
    }
}

/// Resistance in Ohms.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Ohms(pub f64);

impl Ohms {
    /// Standard 50 ohm fixture/reference resistance.
    pub const R50: Self = Self(50.0);
}

/// Capacitance in Farads.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Farads(pub f64);

impl Farads {
    #[inline]
    pub fn from_pf(pf: f64) -> Self {
        Self(pf * 1e-12)
    }

    #[inline]
    pub fn as_pf(&self) -> f64 {
        self.0 * 1e12
    }
}

/// Inductance in Henries.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Henries(pub f64);

impl Henries {
    #[inline]
    pub fn from_nh(nh: f64) -> Self {
        Self(nh * 1e-9)
    }

    #[inline]
    pub fn as_nh(&self) -> f64 {
        self.0 * 1e9
    }
}

/// Raw SI value of a unit newtype, used where values are written out as text.
pub trait SiValue: Copy {
    fn si(self) -> f64;
}

macro_rules! impl_si_value {
    ($($ty:ty),*) => {
        $(impl SiValue for $ty {
            #[inline]
            fn si(self) -> f64 {
                self.0
            }
        })*
    };
}

impl_si_value!(Seconds, Volts, Ohms, Farads, Henries);

impl SiValue for f64 {
    #[inline]
    fn si(self) -> f64 {
        self
    }
}
