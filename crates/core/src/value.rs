use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Mul};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::id::{Id, TimestampMs};
use crate::item::ReasonTemplate;

/// First and last name as stored on the wire; the last name is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName {
    pub first: String,
    #[serde(default)]
    pub last: Option<String>,
}

impl PersonName {
    pub fn new(first: impl Into<String>, last: Option<String>) -> Self {
        Self { first: first.into(), last }
    }
}

impl fmt::Display for PersonName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.last {
            Some(last) => write!(f, "{} {}", self.first, last),
            None => f.write_str(&self.first),
        }
    }
}

/// A non-negative monetary amount, split into whole units and a subunit
/// in 0..=99. The wire representation is a plain JSON number (`12.5`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Amount {
    units: u32,
    subunits: u8,
}

impl Amount {
    pub fn new(units: u32, subunits: u8) -> Self {
        Self { units, subunits: subunits.min(99) }
    }

    pub const ZERO: Amount = Amount { units: 0, subunits: 0 };

    pub fn units(&self) -> u32 {
        self.units
    }

    pub fn subunits(&self) -> u8 {
        self.subunits
    }

    pub fn to_f64(self) -> f64 {
        f64::from(self.units) + f64::from(self.subunits) / 100.0
    }

    /// Negative or non-finite input clamps to zero, as the source does.
    pub fn from_f64(value: f64) -> Self {
        let value = if value.is_finite() && value > 0.0 { value } else { 0.0 };
        let mut units = value.trunc() as u32;
        let mut subunits = ((value - value.trunc()) * 100.0).round() as u32;
        if subunits >= 100 {
            units += 1;
            subunits = 0;
        }
        Self { units, subunits: subunits as u8 }
    }

    pub fn is_zero(&self) -> bool {
        self.units == 0 && self.subunits == 0
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        let subunits = u32::from(self.subunits) + u32::from(rhs.subunits);
        Amount {
            units: self.units.saturating_add(rhs.units).saturating_add(subunits / 100),
            subunits: (subunits % 100) as u8,
        }
    }
}

impl Mul<u32> for Amount {
    type Output = Amount;

    fn mul(self, rhs: u32) -> Amount {
        let subunits = u64::from(self.subunits) * u64::from(rhs);
        let carry = u32::try_from(subunits / 100).unwrap_or(u32::MAX);
        Amount {
            units: self.units.saturating_mul(rhs).saturating_add(carry),
            subunits: (subunits % 100) as u8,
        }
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, Add::add)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.subunits == 0 {
            write!(f, "{}", self.units)
        } else {
            write!(f, "{},{:02}", self.units, self.subunits)
        }
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.to_f64())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Ok(Amount::from_f64(value))
    }
}

/// Importance of a fine or reason template. Variant order gives
/// `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    Medium,
    High,
}

/// Payment state of a fine.
///
/// Wire format: `{ "state": "payed" | "settled" | "unpayed",
/// "payDate"?: number, "inApp"?: boolean }`. `payDate` is required when the
/// state is `payed`; a missing `inApp` reads as `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayedState {
    Payed { pay_date: TimestampMs, in_app: bool },
    Settled,
    Unpayed,
}

impl PayedState {
    pub fn state_str(&self) -> &'static str {
        match self {
            PayedState::Payed { .. } => "payed",
            PayedState::Settled => "settled",
            PayedState::Unpayed => "unpayed",
        }
    }

    pub fn pay_date(&self) -> Option<TimestampMs> {
        match self {
            PayedState::Payed { pay_date, .. } => Some(*pay_date),
            _ => None,
        }
    }

    pub fn in_app(&self) -> Option<bool> {
        match self {
            PayedState::Payed { in_app, .. } => Some(*in_app),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePayed {
    state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pay_date: Option<TimestampMs>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    in_app: Option<bool>,
}

impl Serialize for PayedState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WirePayed {
            state: self.state_str().to_string(),
            pay_date: self.pay_date(),
            in_app: self.in_app(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PayedState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WirePayed::deserialize(deserializer)?;
        match wire.state.as_str() {
            "unpayed" => Ok(PayedState::Unpayed),
            "settled" => Ok(PayedState::Settled),
            "payed" => {
                let pay_date = wire.pay_date.ok_or_else(|| {
                    serde::de::Error::custom("payed state without payDate")
                })?;
                Ok(PayedState::Payed { pay_date, in_app: wire.in_app.unwrap_or(false) })
            }
            other => Err(serde::de::Error::custom(format!("invalid payed state: {other}"))),
        }
    }
}

/// Reason of a fine: either a reference to a reason template or an inline
/// custom reason.
///
/// Wire format: `{ "templateId": string }` or
/// `{ "reason": string, "amount": number, "importance": string }`.
#[derive(Debug, Clone, PartialEq)]
pub enum FineReason {
    Template(Id<ReasonTemplate>),
    Custom { reason: String, amount: Amount, importance: Importance },
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct WireFineReason {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    template_id: Option<Id<ReasonTemplate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    amount: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    importance: Option<Importance>,
}

impl Serialize for FineReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            FineReason::Template(id) => {
                WireFineReason { template_id: Some(id.clone()), ..Default::default() }
            }
            FineReason::Custom { reason, amount, importance } => WireFineReason {
                reason: Some(reason.clone()),
                amount: Some(*amount),
                importance: Some(*importance),
                ..Default::default()
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FineReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireFineReason::deserialize(deserializer)?;
        if let Some(template_id) = wire.template_id {
            return Ok(FineReason::Template(template_id));
        }
        match (wire.reason, wire.amount, wire.importance) {
            (Some(reason), Some(amount), Some(importance)) => {
                Ok(FineReason::Custom { reason, amount, importance })
            }
            _ => Err(serde::de::Error::custom(
                "fine reason needs templateId or reason/amount/importance",
            )),
        }
    }
}

/// Unit of a late payment interest period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodUnit {
    Day,
    Month,
    Year,
}

/// Value and unit of a time period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub value: u32,
    pub unit: PeriodUnit,
}

/// Late payment interest configuration of a club, stored as a nullable
/// value at `clubs/{id}/latePaymentInterest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatePaymentInterest {
    pub interest_free_period: Period,
    pub interest_rate: f64,
    pub interest_period: Period,
    pub compound_interest: bool,
}
