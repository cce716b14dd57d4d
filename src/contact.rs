use serde::Serialize;
use thiserror::Error;

const MAX_MESSAGE_CHARS: usize = 5_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContactError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("email address looks invalid")]
    InvalidEmail,
    #[error("message is longer than 5000 characters")]
    MessageTooLong,
    #[error("a message is already being sent")]
    AlreadySending,
}

/// Raw field values as typed into the form.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContactForm {
    pub organization: String,
    pub name: String,
    pub email: String,
    pub message: String,
}

/// JSON body accepted by the form relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContactSubmission {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    pub name: String,
    pub email: String,
    pub message: String,
    #[serde(rename = "_subject")]
    pub subject: String,
}

impl ContactForm {
    pub fn validate(&self) -> Result<ContactSubmission, ContactError> {
        let name = self.name.trim();
        let email = self.email.trim();
        let message = self.message.trim();

        if name.is_empty() {
            return Err(ContactError::Missing("name"));
        }
        if email.is_empty() {
            return Err(ContactError::Missing("email"));
        }
        if !looks_like_email(email) {
            return Err(ContactError::InvalidEmail);
        }
        if message.is_empty() {
            return Err(ContactError::Missing("message"));
        }
        if message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ContactError::MessageTooLong);
        }

        let organization = Some(self.organization.trim())
            .filter(|value| !value.is_empty())
            .map(ToString::to_string);

        Ok(ContactSubmission {
            organization,
            name: name.to_string(),
            email: email.to_string(),
            message: message.to_string(),
            subject: format!("Portfolio message from {name}"),
        })
    }
}

fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty())
        && !value.chars().any(char::is_whitespace)
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ContactStatus {
    #[default]
    Idle,
    Sending,
    Sent,
    Failed(String),
}

impl ContactStatus {
    /// Moves into `Sending`; refuses while a send is in flight.
    pub fn begin(&self) -> Result<Self, ContactError> {
        match self {
            Self::Sending => Err(ContactError::AlreadySending),
            Self::Idle | Self::Sent | Self::Failed(_) => Ok(Self::Sending),
        }
    }

    pub fn finish(result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::Sent,
            Err(reason) => Self::Failed(reason),
        }
    }

    pub fn is_sending(&self) -> bool {
        matches!(self, Self::Sending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled() -> ContactForm {
        ContactForm {
            organization: "  ".to_string(),
            name: " Ada ".to_string(),
            email: "ada@example.com".to_string(),
            message: "Let's build something.".to_string(),
        }
    }

    #[test]
    fn valid_form_is_trimmed_into_a_submission() {
        let submission = filled().validate().expect("valid form");

        assert_eq!(submission.name, "Ada");
        assert_eq!(submission.organization, None);
        assert_eq!(submission.subject, "Portfolio message from Ada");

        let body = serde_json::to_value(&submission).expect("serializable");
        assert_eq!(body["_subject"], "Portfolio message from Ada");
        assert!(body.get("organization").is_none());
    }

    #[test]
    fn missing_and_malformed_fields_are_reported() {
        let mut form = filled();
        form.name.clear();
        assert_eq!(form.validate(), Err(ContactError::Missing("name")));

        let mut form = filled();
        form.email = "ada@localhost".to_string();
        assert_eq!(form.validate(), Err(ContactError::InvalidEmail));

        let mut form = filled();
        form.email = "ada @example.com".to_string();
        assert_eq!(form.validate(), Err(ContactError::InvalidEmail));

        let mut form = filled();
        form.message = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert_eq!(form.validate(), Err(ContactError::MessageTooLong));
    }

    #[test]
    fn status_refuses_double_send() {
        let sending = ContactStatus::Idle.begin().expect("idle can send");
        assert!(sending.is_sending());
        assert_eq!(sending.begin(), Err(ContactError::AlreadySending));

        let failed = ContactStatus::finish(Err("relay returned 500".to_string()));
        assert_eq!(failed.begin(), Ok(ContactStatus::Sending));
        assert_eq!(ContactStatus::finish(Ok(())), ContactStatus::Sent);
    }
}
