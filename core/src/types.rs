//! Domain types for the studio booking platform.
//!
//! Value objects (identifiers, [`Money`]), catalog entities ([`Package`],
//! [`ClassType`]), ledger entries ([`Purchase`]), bookable sessions
//! ([`ClassSession`]) and [`Reservation`]s, plus the [`Caller`] identity handed
//! in by the authentication boundary.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Creates a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            #[doc = concat!("Creates a `", stringify!($name), "` from any string-like value")]
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Borrow the identifier as a string slice
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a studio member
    UserId
);
uuid_id!(
    /// Unique identifier for a bookable class session
    SessionId
);
uuid_id!(
    /// Unique identifier for a package purchase (ledger entry)
    PurchaseId
);
uuid_id!(
    /// Unique identifier for a reservation
    ReservationId
);
uuid_id!(
    /// Unique identifier for an instructor
    InstructorId
);

string_id!(
    /// Catalog identifier for a credit package (e.g. `pkg-10`)
    PackageId
);
string_id!(
    /// Catalog identifier for a class type (e.g. `reformer-basic`)
    ClassTypeId
);
string_id!(
    /// Payment identifier assigned by the external payment gateway.
    ///
    /// Unique per captured payment; used as the idempotency key for every
    /// effect a payment produces.
    ExternalPaymentId
);

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in cents to avoid floating-point arithmetic errors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole currency units, `None` on overflow
    #[must_use]
    pub const fn checked_from_units(units: u64) -> Option<Self> {
        match units.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Returns the amount as a decimal number of currency units.
    ///
    /// Only for handing prices to external APIs that expect decimals.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_units_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Caller (authentication boundary)
// ============================================================================

/// Role of an authenticated caller
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular studio member
    Member,
    /// Studio staff with administrative rights
    Admin,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "member" | "user" => Ok(Self::Member),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Authenticated identity supplied by the auth boundary.
///
/// The core trusts this value without re-verifying credentials.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Authenticated user
    pub user_id: UserId,
    /// Role granted to the user
    pub role: Role,
}

impl Caller {
    /// A regular member
    #[must_use]
    pub const fn member(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Member,
        }
    }

    /// An administrator
    #[must_use]
    pub const fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    /// Whether the caller holds the admin role
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Credit package offered in the catalog
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Catalog id
    pub id: PackageId,
    /// Display name
    pub name: String,
    /// Credits granted on purchase (> 0)
    pub credit_count: u32,
    /// Days the credits stay valid after purchase (> 0)
    pub valid_days: u32,
    /// Price (> 0)
    pub price: Money,
}

impl Package {
    /// Checks the catalog constraints.
    ///
    /// # Errors
    ///
    /// Returns a description of the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("package name must not be empty".to_string());
        }
        if self.credit_count == 0 {
            return Err("package credit count must be greater than zero".to_string());
        }
        if self.valid_days == 0 {
            return Err("package validity must be at least one day".to_string());
        }
        if self.price.is_zero() {
            return Err("package price must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Kind of class offered by the studio
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassType {
    /// Catalog id
    pub id: ClassTypeId,
    /// Display name (e.g. "Reformer Basics")
    pub name: String,
    /// Free-form level ("Beginner", "Advanced")
    pub level: Option<String>,
    /// Capacity used when scheduling new sessions of this type
    pub default_capacity: u32,
}

// ============================================================================
// Ledger
// ============================================================================

/// A purchased credit package (ledger entry).
///
/// Never deleted; expires logically once `expires_at` passes or credits run out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    /// Ledger entry id
    pub id: PurchaseId,
    /// Owner
    pub user_id: UserId,
    /// Package bought
    pub package_id: PackageId,
    /// Purchase time
    pub bought_at: DateTime<Utc>,
    /// `bought_at + valid_days`, or the forced-expiry time
    pub expires_at: DateTime<Utc>,
    /// Remaining credits, `0..=package.credit_count`
    pub credits_left: u32,
    /// Gateway payment that paid for this purchase, unique when present
    pub external_payment_id: Option<ExternalPaymentId>,
}

impl Purchase {
    /// Builds a fresh ledger entry for `package` bought at `now`.
    #[must_use]
    pub fn from_package(
        user_id: UserId,
        package: &Package,
        now: DateTime<Utc>,
        external_payment_id: Option<ExternalPaymentId>,
    ) -> Self {
        Self {
            id: PurchaseId::new(),
            user_id,
            package_id: package.id.clone(),
            bought_at: now,
            expires_at: now + Duration::days(i64::from(package.valid_days)),
            credits_left: package.credit_count,
            external_payment_id,
        }
    }

    /// Whether the validity period has ended
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Active iff not expired and credits remain
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && self.credits_left > 0
    }

    /// Whole days left until expiry, rounded up (0 once expired)
    #[must_use]
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        let remaining = self.expires_at - now;
        if remaining <= Duration::zero() {
            return 0;
        }
        let days = remaining.num_days();
        if remaining > Duration::days(days) {
            days + 1
        } else {
            days
        }
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// A scheduled, bookable class session with its seat counter
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSession {
    /// Session id
    pub id: SessionId,
    /// Kind of class
    pub class_type_id: ClassTypeId,
    /// Assigned instructor, if any
    pub instructor_id: Option<InstructorId>,
    /// Start time
    pub starts_at: DateTime<Utc>,
    /// Seat capacity (> 0)
    pub capacity: u32,
    /// Completed reservations currently holding a seat, `0..=capacity`
    pub reserved_count: u32,
}

impl ClassSession {
    /// Creates an empty session
    #[must_use]
    pub fn new(class_type_id: ClassTypeId, starts_at: DateTime<Utc>, capacity: u32) -> Self {
        Self {
            id: SessionId::new(),
            class_type_id,
            instructor_id: None,
            starts_at,
            capacity,
            reserved_count: 0,
        }
    }

    /// No seat left
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.reserved_count >= self.capacity
    }

    /// Seats still free
    #[must_use]
    pub const fn available(&self) -> u32 {
        self.capacity.saturating_sub(self.reserved_count)
    }

    /// The session started (or starts right now)
    #[must_use]
    pub fn has_started(&self, now: DateTime<Utc>) -> bool {
        self.starts_at <= now
    }
}

// ============================================================================
// Reservations
// ============================================================================

/// How a reservation is paid for
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// One credit from a purchased package
    Package,
    /// A one-off payment through the gateway
    SingleClass,
}

impl PaymentMethod {
    /// Wire / storage name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::SingleClass => "single_class",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = crate::error::BookingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "package" => Ok(Self::Package),
            "single_class" => Ok(Self::SingleClass),
            other => Err(crate::error::BookingError::InvalidPaymentMethod(other.to_string())),
        }
    }
}

/// Payment state of a reservation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Awaiting gateway confirmation
    Pending,
    /// Paid; the reservation holds a seat
    Completed,
    /// Payment rejected
    Failed,
}

impl PaymentStatus {
    /// Wire / storage name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

/// What funds a reservation.
///
/// Package reservations always reference a purchase; single-class reservations
/// always carry the price paid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "payment_method", rename_all = "snake_case")]
pub enum Funding {
    /// One credit of this purchase
    Package {
        /// Purchase the credit came from
        purchase_id: PurchaseId,
    },
    /// A one-off payment
    SingleClass {
        /// Price charged for the class
        price: Money,
    },
}

impl Funding {
    /// The payment method this funding corresponds to
    #[must_use]
    pub const fn method(&self) -> PaymentMethod {
        match self {
            Self::Package { .. } => PaymentMethod::Package,
            Self::SingleClass { .. } => PaymentMethod::SingleClass,
        }
    }

    /// Purchase id for package funding
    #[must_use]
    pub const fn purchase_id(&self) -> Option<PurchaseId> {
        match self {
            Self::Package { purchase_id } => Some(*purchase_id),
            Self::SingleClass { .. } => None,
        }
    }
}

/// A user's seat in a class session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation id
    pub id: ReservationId,
    /// Who holds the seat
    pub user_id: UserId,
    /// Session booked
    pub session_id: SessionId,
    /// Package credit or single-class payment
    #[serde(flatten)]
    pub funding: Funding,
    /// Payment state; only `Completed` counts toward `reserved_count`
    pub payment_status: PaymentStatus,
    /// Gateway payment for single-class bookings
    pub external_payment_id: Option<ExternalPaymentId>,
    /// When the reservation row was created
    pub reserved_at: DateTime<Utc>,
    /// When payment completed
    pub payment_completed_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// A completed reservation paid with one package credit
    #[must_use]
    pub fn with_package_credit(
        user_id: UserId,
        session_id: SessionId,
        purchase_id: PurchaseId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            user_id,
            session_id,
            funding: Funding::Package { purchase_id },
            payment_status: PaymentStatus::Completed,
            external_payment_id: None,
            reserved_at: now,
            payment_completed_at: Some(now),
        }
    }

    /// A completed reservation paid through the gateway
    #[must_use]
    pub fn with_single_payment(
        user_id: UserId,
        session_id: SessionId,
        price: Money,
        payment_id: ExternalPaymentId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            user_id,
            session_id,
            funding: Funding::SingleClass { price },
            payment_status: PaymentStatus::Completed,
            external_payment_id: Some(payment_id),
            reserved_at: now,
            payment_completed_at: Some(now),
        }
    }

    /// Payment method of this reservation
    #[must_use]
    pub const fn payment_method(&self) -> PaymentMethod {
        self.funding.method()
    }

    /// Whether this reservation holds a seat
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.payment_status == PaymentStatus::Completed
    }
}

/// Descriptor for a single-class booking awaiting payment.
///
/// No reservation exists yet; the caller hands this to checkout, and the seat
/// materializes when the payment is confirmed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Who is booking
    pub user_id: UserId,
    /// Session to book
    pub session_id: SessionId,
    /// Price to charge
    pub price: Money,
    /// Human readable label for the checkout item
    pub session_label: String,
}
