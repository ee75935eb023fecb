pub mod plan;
pub mod session;

pub use plan::{
    CredentialSet, ExpectedOutcome, GlobalConfig, ParamValue, Params, Phase, PlanOperation,
    ResponseAssertions, TestGroup, TestPlan,
};
pub use session::{
    DurationStats, GroupOutcome, GroupStatus, ResultRecord, ResultStatus, Session, Summary,
};

/// Serde helpers: durations are written as fractional milliseconds.
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(d: &Duration, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_f64(d.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = f64::deserialize(d)?;
        if !ms.is_finite() || ms < 0.0 {
            return Err(serde::de::Error::custom("duration must be a non-negative number"));
        }
        Duration::try_from_secs_f64(ms / 1000.0).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::Serializer;
        use std::time::Duration;

        pub fn serialize<S>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match d {
                Some(d) => s.serialize_some(&(d.as_secs_f64() * 1000.0)),
                None => s.serialize_none(),
            }
        }
    }
}
