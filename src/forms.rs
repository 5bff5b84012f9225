use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::api::BackendClient;
use crate::cancel::CancelToken;
use crate::code_store::{CodeStore, CodeStoreError};
use crate::error::ApiError;
use crate::models::{Emotion, Kind};

/// Validation messages keyed by the field they belong to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<&'static str, String>);

impl FieldErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.0.iter().map(|(field, message)| (*field, message.as_str()))
    }

    fn into_result<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in self.iter() {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

#[derive(Debug, thiserror::Error)]
pub enum FormError {
    #[error("{0}")]
    Invalid(#[from] FieldErrors),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] CodeStoreError),
}

/// Teacher side: open a check-in or check-out window for a class.
#[derive(Debug, Clone)]
pub struct ReleaseForm {
    pub kind: Kind,
    pub class_name: String,
}

impl ReleaseForm {
    pub fn validate(&self) -> Result<&str, FieldErrors> {
        let class_name = self.class_name.trim();
        let mut errors = FieldErrors::default();
        if class_name.is_empty() {
            errors.add("class", "Select or create a class.");
        }
        errors.into_result(class_name)
    }

    pub async fn submit(
        &self,
        client: &BackendClient,
        cancel: &CancelToken,
    ) -> Result<String, FormError> {
        let class_name = self.validate()?;
        let code = client.release_code(self.kind, class_name, cancel).await?;
        tracing::info!(kind = %self.kind, class = class_name, "window released");
        Ok(code)
    }
}

/// Student side: trade the code shared by the teacher for access to the survey.
#[derive(Debug, Clone)]
pub struct RedeemForm {
    pub code: String,
}

impl RedeemForm {
    pub fn validate(&self) -> Result<&str, FieldErrors> {
        let code = self.code.trim();
        let mut errors = FieldErrors::default();
        if code.is_empty() {
            errors.add("code", "Enter the code your teacher shared.");
        }
        errors.into_result(code)
    }

    pub async fn submit(
        &self,
        client: &BackendClient,
        store: &CodeStore,
        cancel: &CancelToken,
    ) -> Result<(), FormError> {
        let code = self.validate()?;
        if !client.verify_code(code, cancel).await? {
            return Err(FieldErrors::single("code", "Code invalid or expired.").into());
        }
        let expires_at = store.save(code, Utc::now())?;
        tracing::info!(%expires_at, "check-in code accepted");
        Ok(())
    }
}

/// Accepts a wire code (`1`..`9`) or a label in Portuguese or English.
pub fn parse_emotion_choice(raw: &str) -> Option<Emotion> {
    let choice = raw.trim();
    if let Ok(code) = choice.parse::<i64>() {
        return Emotion::from_code(code);
    }
    Emotion::ALL.into_iter().find(|emotion| {
        emotion.label().eq_ignore_ascii_case(choice)
            || emotion.english().eq_ignore_ascii_case(choice)
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub emotion: Emotion,
    pub message: &'static str,
}

/// Student side: send the mood picked for the current check-in window.
#[derive(Debug, Clone)]
pub struct EmojiForm {
    pub selection: Option<String>,
}

impl EmojiForm {
    pub fn validate(&self) -> Result<Emotion, FieldErrors> {
        let selection = self
            .selection
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        match selection {
            None => Err(FieldErrors::single(
                "emotion",
                "Pick the emoji that matches how you feel.",
            )),
            Some(raw) => parse_emotion_choice(raw).ok_or_else(|| {
                FieldErrors::single("emotion", format!("`{raw}` is not one of the nine emotions."))
            }),
        }
    }

    pub async fn submit(
        &self,
        client: &BackendClient,
        store: &CodeStore,
        cancel: &CancelToken,
    ) -> Result<Confirmation, FormError> {
        let emotion = self.validate()?;
        let Some(code) = store.load(Utc::now())? else {
            return Err(FieldErrors::single(
                "code",
                "No check-in code in progress; redeem your teacher's code first.",
            )
            .into());
        };

        client.register_emotion(&code, emotion, cancel).await?;
        store.clear()?;
        Ok(Confirmation {
            emotion,
            message: "Vibe Check finalizada com sucesso!",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Resident {
    #[serde(rename = "sim")]
    Yes,
    #[serde(rename = "nao")]
    No,
}

/// Student profile questionnaire filled once before the first check-in.
#[derive(Debug, Clone, Default)]
pub struct RegistrationForm {
    pub meeting_date: Option<NaiveDate>,
    pub sex: String,
    pub ifpe_resident: Option<Resident>,
    pub self_regulation: String,
    pub liked_genres: String,
    pub disliked_genres: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationPayload {
    #[serde(rename = "data")]
    pub meeting_date: NaiveDate,
    #[serde(rename = "sexo")]
    pub sex: String,
    #[serde(rename = "moradorIFPE")]
    pub ifpe_resident: Resident,
    #[serde(rename = "autoRegular")]
    pub self_regulation: String,
    #[serde(rename = "generosGostos")]
    pub liked_genres: String,
    #[serde(rename = "generosNaoGostos")]
    pub disliked_genres: String,
}

impl RegistrationForm {
    pub fn validate(&self, today: NaiveDate) -> Result<RegistrationPayload, FieldErrors> {
        let mut errors = FieldErrors::default();

        match self.meeting_date {
            None => errors.add("meeting_date", "Select the meeting date."),
            Some(date) if date > today => {
                errors.add("meeting_date", "The date cannot be in the future.")
            }
            Some(_) => {}
        }
        if self.sex.trim().is_empty() {
            errors.add("sex", "Tell us your sex.");
        }
        if self.ifpe_resident.is_none() {
            errors.add("ifpe_resident", "Say whether you live at IFPE.");
        }
        if self.self_regulation.trim().is_empty() {
            errors.add("self_regulation", "Describe how you self-regulate.");
        }
        if self.liked_genres.trim().is_empty() {
            errors.add("liked_genres", "List the music genres you like.");
        }
        if self.disliked_genres.trim().is_empty() {
            errors.add("disliked_genres", "List the music genres you dislike.");
        }

        match (self.meeting_date, self.ifpe_resident) {
            (Some(meeting_date), Some(ifpe_resident)) if errors.is_empty() => {
                Ok(RegistrationPayload {
                    meeting_date,
                    sex: self.sex.trim().to_string(),
                    ifpe_resident,
                    self_regulation: self.self_regulation.trim().to_string(),
                    liked_genres: self.liked_genres.trim().to_string(),
                    disliked_genres: self.disliked_genres.trim().to_string(),
                })
            }
            _ => Err(errors),
        }
    }
}
