//! Static copy for the page, embedded at build time from `content/site.json`.

use serde::Deserialize;
use thiserror::Error;

const SITE_JSON: &str = include_str!("../content/site.json");

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("site content is malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("site content is invalid: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Site {
    pub hero: Hero,
    pub about: About,
    pub experience: Vec<Experience>,
    pub gallery: Gallery,
    pub links: Vec<Link>,
    pub contact: ContactTarget,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Hero {
    pub title: String,
    pub description: String,
    pub actions: Vec<Action>,
    pub tags: Vec<String>,
    pub previously_at: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Action {
    pub text: String,
    pub href: String,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct About {
    pub portrait: String,
    pub paragraphs: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Experience {
    pub position: String,
    pub company: String,
    pub logo: String,
    pub dates: String,
    pub location: String,
    pub points: Vec<String>,
    pub skills: Vec<String>,
    pub color: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Gallery {
    pub photos: Vec<String>,
    #[serde(default)]
    pub videos: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Link {
    pub label: String,
    pub href: String,
}

impl Link {
    pub fn is_external(&self) -> bool {
        self.href.starts_with("http")
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ContactTarget {
    pub endpoint: String,
}

impl Site {
    pub fn embedded() -> Result<Self, ContentError> {
        Self::parse(SITE_JSON)
    }

    pub fn parse(raw: &str) -> Result<Self, ContentError> {
        let site: Site = serde_json::from_str(raw)?;
        site.validate()?;
        Ok(site)
    }

    fn validate(&self) -> Result<(), ContentError> {
        if self.experience.is_empty() {
            return Err(ContentError::Invalid(
                "experience list must not be empty".to_string(),
            ));
        }

        if let Some(entry) = self
            .experience
            .iter()
            .find(|entry| entry.points.is_empty())
        {
            return Err(ContentError::Invalid(format!(
                "experience at {} has no points",
                entry.company
            )));
        }

        if self.hero.title.trim().is_empty() {
            return Err(ContentError::Invalid("hero title is empty".to_string()));
        }

        Ok(())
    }
}
