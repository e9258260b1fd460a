use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }
            pub fn from_str(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(PoolId);
id_newtype!(MemberId);
id_newtype!(TaskId);
id_newtype!(RunId);

impl RunId {
    /// Stable id for the run of `pool_id` on `date`. A pool runs at most once a day,
    /// so two workers computing the same run always agree on its id.
    pub fn for_pool_date(pool_id: &PoolId, date: NaiveDate) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(pool_id.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(date.format("%Y-%m-%d").to_string().as_bytes());
        let digest = hasher.finalize();
        Self(format!("run-{}", hex::encode(&digest[..12])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_is_stable_per_pool_and_date() {
        let pool = PoolId::from_str("kitchen");
        let d = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let a = RunId::for_pool_date(&pool, d);
        let b = RunId::for_pool_date(&pool, d);
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("run-"));
        assert_eq!(a.as_str().len(), 4 + 24);

        let next_day = RunId::for_pool_date(&pool, d.succ_opt().unwrap());
        assert_ne!(a, next_day);
        let other_pool = RunId::for_pool_date(&PoolId::from_str("garden"), d);
        assert_ne!(a, other_pool);
    }
}
