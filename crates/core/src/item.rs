use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::id::{Id, TimestampMs};
use crate::value::{Amount, FineReason, Importance, PayedState, PersonName};

/// An item living in one of the per-club lists of the remote store.
///
/// The wire payload (`Wire`) carries everything except the id; the id is the
/// child key the item is stored under.
pub trait ListItem: Clone + Send + Sync + Sized + 'static {
    /// Path component of the list under the club node, e.g. `persons`.
    const PATH: &'static str;

    type Wire: Serialize + DeserializeOwned + Send;

    fn id(&self) -> Id<Self>;
    fn from_wire(id: Id<Self>, wire: Self::Wire) -> Self;
    fn to_wire(&self) -> Self::Wire;
}

/// A list item the `changeList` remote operation can update or delete.
pub trait Changeable: ListItem {
    /// List type tag of the `changeList` operation, e.g. `person`.
    const KIND: &'static str;

    /// Flattened per-type parameters of a `changeList` update, using the
    /// parameter names the backend expects.
    fn update_parameters(&self) -> Map<String, Value>;
}

// ---- Person ----

/// A club member.
#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: Id<Person>,
    pub name: PersonName,
    pub sign_in_data: Option<SignInData>,
}

/// Present when the member has registered an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignInData {
    #[serde(rename = "cashier")]
    pub is_cashier: bool,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "signInDate")]
    pub sign_in_date: TimestampMs,
}

#[derive(Serialize, Deserialize)]
pub struct PersonWire {
    pub name: PersonName,
    #[serde(rename = "signInData", default, skip_serializing_if = "Option::is_none")]
    pub sign_in_data: Option<SignInData>,
}

impl ListItem for Person {
    const PATH: &'static str = "persons";
    type Wire = PersonWire;

    fn id(&self) -> Id<Person> {
        self.id.clone()
    }

    fn from_wire(id: Id<Person>, wire: PersonWire) -> Self {
        Self { id, name: wire.name, sign_in_data: wire.sign_in_data }
    }

    fn to_wire(&self) -> PersonWire {
        PersonWire { name: self.name.clone(), sign_in_data: self.sign_in_data.clone() }
    }
}

impl Changeable for Person {
    const KIND: &'static str = "person";

    fn update_parameters(&self) -> Map<String, Value> {
        let mut parameters = Map::new();
        parameters.insert("firstName".into(), json!(self.name.first));
        parameters.insert("lastName".into(), json!(self.name.last));
        parameters
    }
}

// ---- Fine ----

/// A monetary fine issued against a person.
#[derive(Debug, Clone, PartialEq)]
pub struct Fine {
    pub id: Id<Fine>,
    pub person_id: Id<Person>,
    pub date: TimestampMs,
    pub payed: PayedState,
    pub number: u32,
    pub reason: FineReason,
}

#[derive(Serialize, Deserialize)]
pub struct FineWire {
    #[serde(rename = "personId")]
    pub person_id: Id<Person>,
    pub date: TimestampMs,
    pub payed: PayedState,
    pub number: u32,
    pub reason: FineReason,
}

impl ListItem for Fine {
    const PATH: &'static str = "fines";
    type Wire = FineWire;

    fn id(&self) -> Id<Fine> {
        self.id.clone()
    }

    fn from_wire(id: Id<Fine>, wire: FineWire) -> Self {
        Self {
            id,
            person_id: wire.person_id,
            date: wire.date,
            payed: wire.payed,
            number: wire.number,
            reason: wire.reason,
        }
    }

    fn to_wire(&self) -> FineWire {
        FineWire {
            person_id: self.person_id.clone(),
            date: self.date,
            payed: self.payed,
            number: self.number,
            reason: self.reason.clone(),
        }
    }
}

impl Changeable for Fine {
    const KIND: &'static str = "fine";

    fn update_parameters(&self) -> Map<String, Value> {
        let mut parameters = Map::new();
        parameters.insert("personId".into(), json!(self.person_id));
        parameters.insert("number".into(), json!(self.number));
        parameters.insert("date".into(), json!(self.date));
        parameters.insert("payedState".into(), json!(self.payed.state_str()));
        parameters.insert("payedPayDate".into(), json!(self.payed.pay_date()));
        parameters.insert("payedInApp".into(), json!(self.payed.in_app()));
        match &self.reason {
            FineReason::Template(template_id) => {
                parameters.insert("templateId".into(), json!(template_id));
            }
            FineReason::Custom { reason, amount, importance } => {
                parameters.insert("reason".into(), json!(reason));
                parameters.insert("amount".into(), json!(amount));
                parameters.insert("importance".into(), json!(importance));
            }
        }
        parameters
    }
}

// ---- ReasonTemplate ----

/// A catalog entry fines can reference instead of carrying a custom reason.
#[derive(Debug, Clone, PartialEq)]
pub struct ReasonTemplate {
    pub id: Id<ReasonTemplate>,
    pub reason: String,
    pub importance: Importance,
    pub amount: Amount,
}

#[derive(Serialize, Deserialize)]
pub struct ReasonTemplateWire {
    pub reason: String,
    pub importance: Importance,
    pub amount: Amount,
}

impl ListItem for ReasonTemplate {
    const PATH: &'static str = "reasons";
    type Wire = ReasonTemplateWire;

    fn id(&self) -> Id<ReasonTemplate> {
        self.id.clone()
    }

    fn from_wire(id: Id<ReasonTemplate>, wire: ReasonTemplateWire) -> Self {
        Self { id, reason: wire.reason, importance: wire.importance, amount: wire.amount }
    }

    fn to_wire(&self) -> ReasonTemplateWire {
        ReasonTemplateWire {
            reason: self.reason.clone(),
            importance: self.importance,
            amount: self.amount,
        }
    }
}

impl Changeable for ReasonTemplate {
    const KIND: &'static str = "reason";

    fn update_parameters(&self) -> Map<String, Value> {
        let mut parameters = Map::new();
        parameters.insert("reason".into(), json!(self.reason));
        parameters.insert("amount".into(), json!(self.amount));
        parameters.insert("importance".into(), json!(self.importance));
        parameters
    }
}

// ---- Transaction ----

/// An in-app payment covering one or more fines.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: Id<Transaction>,
    pub approved: bool,
    pub fine_ids: Vec<Id<Fine>>,
    pub name: Option<PersonName>,
    pub pay_date: TimestampMs,
    pub person_id: Id<Person>,
    pub payout_id: Option<String>,
}

#[derive(Serialize, Deserialize)]
pub struct TransactionWire {
    pub approved: bool,
    #[serde(rename = "fineIds")]
    pub fine_ids: Vec<Id<Fine>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<PersonName>,
    #[serde(rename = "payDate")]
    pub pay_date: TimestampMs,
    #[serde(rename = "personId")]
    pub person_id: Id<Person>,
    #[serde(rename = "payoutId", default, skip_serializing_if = "Option::is_none")]
    pub payout_id: Option<String>,
}

impl ListItem for Transaction {
    const PATH: &'static str = "transactions";
    type Wire = TransactionWire;

    fn id(&self) -> Id<Transaction> {
        self.id.clone()
    }

    fn from_wire(id: Id<Transaction>, wire: TransactionWire) -> Self {
        Self {
            id,
            approved: wire.approved,
            fine_ids: wire.fine_ids,
            name: wire.name,
            pay_date: wire.pay_date,
            person_id: wire.person_id,
            payout_id: wire.payout_id,
        }
    }

    fn to_wire(&self) -> TransactionWire {
        TransactionWire {
            approved: self.approved,
            fine_ids: self.fine_ids.clone(),
            name: self.name.clone(),
            pay_date: self.pay_date,
            person_id: self.person_id.clone(),
            payout_id: self.payout_id.clone(),
        }
    }
}

impl Changeable for Transaction {
    const KIND: &'static str = "transaction";

    fn update_parameters(&self) -> Map<String, Value> {
        let mut parameters = Map::new();
        parameters.insert("approved".into(), json!(self.approved));
        parameters.insert("fineIds".into(), json!(self.fine_ids));
        parameters.insert(
            "firstName".into(),
            json!(self.name.as_ref().map(|name| name.first.clone())),
        );
        parameters.insert(
            "lastName".into(),
            json!(self.name.as_ref().and_then(|name| name.last.clone())),
        );
        parameters.insert("payDate".into(), json!(self.pay_date));
        parameters.insert("personId".into(), json!(self.person_id));
        parameters.insert("payoutId".into(), json!(self.payout_id));
        parameters
    }
}

// ---- Payout ----

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus {
    Pending,
    Approved,
    Denied,
}

/// A payout of collected in-app payments; read-only for this client.
#[derive(Debug, Clone, PartialEq)]
pub struct Payout {
    pub id: Id<Payout>,
    pub amount: Amount,
    pub person_detail: String,
    pub status: PayoutStatus,
}

#[derive(Serialize, Deserialize)]
pub struct PayoutWire {
    pub amount: Amount,
    #[serde(rename = "personDetail")]
    pub person_detail: String,
    pub status: PayoutStatus,
}

impl ListItem for Payout {
    const PATH: &'static str = "payouts";
    type Wire = PayoutWire;

    fn id(&self) -> Id<Payout> {
        self.id.clone()
    }

    fn from_wire(id: Id<Payout>, wire: PayoutWire) -> Self {
        Self { id, amount: wire.amount, person_detail: wire.person_detail, status: wire.status }
    }

    fn to_wire(&self) -> PayoutWire {
        PayoutWire {
            amount: self.amount,
            person_detail: self.person_detail.clone(),
            status: self.status,
        }
    }
}

// ---- Club ----

/// Properties of a club; not a bootstrap-managed list, decoded from the
/// club node itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Club {
    #[serde(skip, default = "Id::random")]
    pub id: Id<Club>,
    pub name: String,
    pub identifier: String,
    #[serde(rename = "regionCode")]
    pub region_code: String,
    #[serde(rename = "inAppPaymentActive", default)]
    pub in_app_payment_active: Option<bool>,
}

impl Club {
    pub fn is_in_app_payment_active(&self) -> bool {
        self.in_app_payment_active.unwrap_or(false)
    }
}
