//! Matchmaker results and the links used to share them.
//!
//! A shared result lives entirely in the `city` and `score` query
//! parameters, so opening a link needs no server state.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum City {
    Shanghai,
    Chengdu,
    Guangzhou,
}

impl City {
    pub const ALL: [City; 3] = [City::Shanghai, City::Chengdu, City::Guangzhou];

    pub fn name(self) -> &'static str {
        match self {
            City::Shanghai => "Shanghai",
            City::Chengdu => "Chengdu",
            City::Guangzhou => "Guangzhou",
        }
    }

    pub fn tagline(self) -> &'static str {
        match self {
            City::Shanghai => "The global elite.",
            City::Chengdu => "The chill specialist.",
            City::Guangzhou => "The culinary master.",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            City::Shanghai => "Center of the universe.",
            City::Chengdu => "Loophole to happiness.",
            City::Guangzhou => "Eat and exist in peace.",
        }
    }

    pub fn roast(self) -> &'static str {
        match self {
            City::Shanghai => "Your VPN is your only personality trait.",
            City::Chengdu => "The spicy oil will claim your soul eventually.",
            City::Guangzhou => "You're just here for the Dim Sum.",
        }
    }

    /// Exact-name lookup; anything outside the set is `None`.
    pub fn from_name(name: &str) -> Option<City> {
        City::ALL.into_iter().find(|city| city.name() == name)
    }

    pub fn from_answers(answers: &[char]) -> City {
        let has = |c: char| answers.contains(&c);
        if has('A') && has('C') {
            City::Shanghai
        } else if has('B') && has('D') {
            City::Chengdu
        } else {
            City::Guangzhou
        }
    }
}

impl fmt::Display for City {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub const BASE_READINESS: i64 = 84;

pub fn readiness_score(answers: &[char]) -> i64 {
    BASE_READINESS + (answers.len() as i64 % 15)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchResult {
    pub city: City,
    pub score: i64,
}

impl MatchResult {
    pub fn from_answers(answers: &[char]) -> Self {
        Self {
            city: City::from_answers(answers),
            score: readiness_score(answers),
        }
    }

    pub fn share_url(&self, base: &str) -> Result<Url, ShareError> {
        let mut url = Url::parse(base).map_err(|e| ShareError::InvalidBase(e.to_string()))?;
        url.set_query(None);
        url.set_fragment(None);
        url.query_pairs_mut()
            .append_pair("city", self.city.name())
            .append_pair("score", &self.score.to_string());
        Ok(url)
    }

    /// Rebuilds a shared view from a link. Returns `None` unless both `city`
    /// and `score` are present.
    pub fn from_share_url(url: &Url) -> Option<Self> {
        let mut city = None;
        let mut score = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "city" if !value.is_empty() => city = Some(value.into_owned()),
                "score" if !value.is_empty() => score = Some(value.into_owned()),
                _ => {}
            }
        }

        let (city, score) = (city?, score?);
        Some(Self {
            city: City::from_name(&city).unwrap_or(City::Guangzhou),
            // An unreadable score shows what an empty quiz would
            score: score
                .parse::<i64>()
                .ok()
                .filter(|s| *s != 0)
                .unwrap_or_else(|| readiness_score(&[])),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error("Invalid base URL: {0}")]
    InvalidBase(String),
}
