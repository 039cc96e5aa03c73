//! Typed staking events and the recognized event-kind enumeration.
//!
//! Events are a closed set: each variant carries the payload shape for
//! its kind, and kinds outside the enumeration are rejected at the
//! boundary. The wire names are the snake_case strings subscribers
//! register for.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Recognized staking event kinds.
///
/// This is the fixed enumeration a webhook registration may subscribe
/// to. Parsing an unknown name fails with a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Stake transaction confirmed on chain.
    StakeConfirmed,
    /// Stake became active at an epoch boundary.
    StakeActivated,
    /// Stake deactivation confirmed.
    StakeDeactivated,
    /// Withdrawal of deactivated stake confirmed.
    StakeWithdrawn,
    /// Epoch rewards credited to a stake account.
    RewardEarned,
}

impl EventKind {
    /// All recognized kinds, in wire order.
    pub const ALL: [Self; 5] = [
        Self::StakeConfirmed,
        Self::StakeActivated,
        Self::StakeDeactivated,
        Self::StakeWithdrawn,
        Self::RewardEarned,
    ];

    /// Wire name for this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StakeConfirmed => "stake_confirmed",
            Self::StakeActivated => "stake_activated",
            Self::StakeDeactivated => "stake_deactivated",
            Self::StakeWithdrawn => "stake_withdrawn",
            Self::RewardEarned => "reward_earned",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stake_confirmed" => Ok(Self::StakeConfirmed),
            "stake_activated" => Ok(Self::StakeActivated),
            "stake_deactivated" => Ok(Self::StakeDeactivated),
            "stake_withdrawn" => Ok(Self::StakeWithdrawn),
            "reward_earned" => Ok(Self::RewardEarned),
            other => Err(CoreError::validation(format!("unsupported event type: {other}"))),
        }
    }
}

impl sqlx::Type<sqlx::Postgres> for EventKind {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <&str as sqlx::Type<sqlx::Postgres>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for EventKind {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        s.parse().map_err(|e: CoreError| e.to_string().into())
    }
}

impl sqlx::Encode<'_, sqlx::Postgres> for EventKind {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
    }
}

impl sqlx::postgres::PgHasArrayType for EventKind {
    fn array_type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::postgres::PgHasArrayType>::array_type_info()
    }
}

/// A staking domain event with its typed payload.
///
/// Serializes to `{"event": "<kind>", "data": {...}}` fragments; the
/// dispatcher wraps this in the full delivery envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StakingEvent {
    /// Stake transaction confirmed on chain.
    StakeConfirmed(StakeConfirmed),
    /// Stake became active.
    StakeActivated(StakeActivated),
    /// Stake deactivation confirmed.
    StakeDeactivated(StakeDeactivated),
    /// Deactivated stake withdrawn.
    StakeWithdrawn(StakeWithdrawn),
    /// Epoch rewards credited.
    RewardEarned(RewardEarned),
}

impl StakingEvent {
    /// The kind tag for this event.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::StakeConfirmed(_) => EventKind::StakeConfirmed,
            Self::StakeActivated(_) => EventKind::StakeActivated,
            Self::StakeDeactivated(_) => EventKind::StakeDeactivated,
            Self::StakeWithdrawn(_) => EventKind::StakeWithdrawn,
            Self::RewardEarned(_) => EventKind::RewardEarned,
        }
    }

    /// The payload data as a JSON value, without the event tag.
    pub fn data(&self) -> Result<serde_json::Value, CoreError> {
        let value = match self {
            Self::StakeConfirmed(data) => serde_json::to_value(data)?,
            Self::StakeActivated(data) => serde_json::to_value(data)?,
            Self::StakeDeactivated(data) => serde_json::to_value(data)?,
            Self::StakeWithdrawn(data) => serde_json::to_value(data)?,
            Self::RewardEarned(data) => serde_json::to_value(data)?,
        };
        Ok(value)
    }
}

/// Payload for a confirmed stake transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeConfirmed {
    /// Address of the created stake account.
    pub stake_account: String,
    /// Wallet of the agent that staked.
    pub agent_wallet: String,
    /// Staked amount in lamports.
    pub amount_lamports: u64,
    /// Validator vote account the stake was delegated to.
    pub validator: String,
    /// Transaction signature on chain.
    pub signature: String,
}

/// Payload for a stake activation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeActivated {
    /// Address of the stake account.
    pub stake_account: String,
    /// Validator vote account.
    pub validator: String,
    /// Epoch at which the stake became active.
    pub epoch: u64,
}

/// Payload for a confirmed stake deactivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeDeactivated {
    /// Address of the stake account.
    pub stake_account: String,
    /// Epoch at which deactivation takes effect.
    pub epoch: u64,
}

/// Payload for a confirmed withdrawal of deactivated stake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeWithdrawn {
    /// Address of the stake account withdrawn from.
    pub stake_account: String,
    /// Wallet that received the funds.
    pub destination_wallet: String,
    /// Withdrawn amount in lamports.
    pub amount_lamports: u64,
    /// Transaction signature on chain.
    pub signature: String,
}

/// Payload for epoch rewards credited to a stake account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardEarned {
    /// Address of the stake account.
    pub stake_account: String,
    /// Epoch the rewards were earned in.
    pub epoch: u64,
    /// Reward amount in lamports.
    pub amount_lamports: u64,
    /// Validator vote account.
    pub validator: String,
}
