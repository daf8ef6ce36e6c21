use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::errors::ApplicationError;

/// Calendar "today" as seen from the property, not the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropertyClock {
    timezone: Tz,
}

impl PropertyClock {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn from_name(name: &str) -> Result<Self, ApplicationError> {
        parse_timezone(name).map(Self::new).ok_or_else(|| {
            ApplicationError::Configuration(format!("unknown property timezone `{name}`"))
        })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    pub fn today(&self) -> NaiveDate {
        self.date_at(Utc::now())
    }

    pub fn date_at(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }
}

pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.trim().parse::<Tz>().ok()
}
