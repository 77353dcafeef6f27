//! Kasse core types: tagged ids, money/payment value types and the
//! list item models mirrored from the club database.

#![forbid(unsafe_code)]

mod id;
mod item;
mod value;

pub use id::{now_ms, Id, TimestampMs};
pub use item::{
    Changeable, Club, Fine, ListItem, Payout, PayoutStatus, Person, ReasonTemplate, SignInData,
    Transaction,
};
pub use value::{
    Amount, FineReason, Importance, LatePaymentInterest, PayedState, Period, PeriodUnit,
    PersonName,
};

pub mod prelude {
    pub use super::{
        Amount, Changeable, Fine, FineReason, Id, Importance, ListItem, PayedState, Person,
        PersonName, ReasonTemplate, Transaction,
    };
}
