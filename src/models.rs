use std::fmt;
use std::str::FromStr;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// One check-in or check-out answer as served by `/api/codigo/dashboard`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AttendanceRecord {
    #[serde(rename = "turma")]
    pub class_label: String,
    #[serde(rename = "tipo")]
    pub kind: String,
    /// `dd/MM/yyyy HH:mm`, parsed lazily during aggregation.
    #[serde(rename = "data")]
    pub timestamp: String,
    #[serde(rename = "emocao")]
    pub emotion_code: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    CheckIn,
    CheckOut,
}

impl Kind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Kind::CheckIn => "CHECKIN",
            Kind::CheckOut => "CHECKOUT",
        }
    }

    pub fn release_path(&self) -> &'static str {
        match self {
            Kind::CheckIn => "api/codigo/liberar-checkin",
            Kind::CheckOut => "api/codigo/liberar-checkout",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().replace('-', "").as_str() {
            "CHECKIN" => Ok(Kind::CheckIn),
            "CHECKOUT" => Ok(Kind::CheckOut),
            other => Err(format!("unknown kind `{other}` (expected checkin or checkout)")),
        }
    }
}

/// The nine moods offered by the survey, ordered by their wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Emotion {
    VeryHappy = 1,
    Happy = 2,
    Unmotivated = 3,
    Indifferent = 4,
    Surprised = 5,
    Sad = 6,
    Irritated = 7,
    Anxious = 8,
    InLove = 9,
}

impl Emotion {
    pub const ALL: [Emotion; 9] = [
        Emotion::VeryHappy,
        Emotion::Happy,
        Emotion::Unmotivated,
        Emotion::Indifferent,
        Emotion::Surprised,
        Emotion::Sad,
        Emotion::Irritated,
        Emotion::Anxious,
        Emotion::InLove,
    ];

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|emotion| emotion.code() == code)
    }

    pub fn code(&self) -> i64 {
        *self as i64
    }

    /// Label shown on the survey and used as the chart series name.
    pub fn label(&self) -> &'static str {
        match self {
            Emotion::VeryHappy => "Muito Feliz",
            Emotion::Happy => "Feliz",
            Emotion::Unmotivated => "Desmotivado",
            Emotion::Indifferent => "Indiferente",
            Emotion::Surprised => "Surpreso",
            Emotion::Sad => "Triste",
            Emotion::Irritated => "Irritado",
            Emotion::Anxious => "Ansioso",
            Emotion::InLove => "Apaixonado",
        }
    }

    pub fn english(&self) -> &'static str {
        match self {
            Emotion::VeryHappy => "Very Happy",
            Emotion::Happy => "Happy",
            Emotion::Unmotivated => "Unmotivated",
            Emotion::Indifferent => "Indifferent",
            Emotion::Surprised => "Surprised",
            Emotion::Sad => "Sad",
            Emotion::Irritated => "Irritated",
            Emotion::Anxious => "Anxious",
            Emotion::InLove => "In Love",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    Student,
    Teacher,
    Other(String),
}

impl Role {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "ROLE_ALUNO" => Role::Student,
            "ROLE_PROFESSOR" => Role::Teacher,
            other => Role::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Student => "ROLE_ALUNO",
            Role::Teacher => "ROLE_PROFESSOR",
            Role::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub role: Role,
    pub google_id: String,
    pub email: String,
    pub name: String,
}

/// Body of `/user/details`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetails {
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub google_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
}

impl UserDetails {
    /// The first role wins; a user without roles has no usable session.
    pub fn into_user(self) -> Option<User> {
        let role = self.roles.first()?;
        Some(User {
            role: Role::parse(role),
            google_id: self.google_id,
            email: self.email,
            name: self.name,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClassEntry {
    Name(String),
    Record { nome: String },
}

impl ClassEntry {
    pub fn into_name(self) -> String {
        match self {
            ClassEntry::Name(name) => name,
            ClassEntry::Record { nome, .. } => nome,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseRequest<'a> {
    #[serde(rename = "nomeTurma")]
    pub class_name: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleasedCode {
    #[serde(rename = "codigo")]
    pub code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    Day,
    Week,
    Month,
    #[default]
    All,
}

impl FromStr for Granularity {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Granularity::Day),
            "week" => Ok(Granularity::Week),
            "month" => Ok(Granularity::Month),
            "all" => Ok(Granularity::All),
            other => Err(format!("unknown granularity `{other}` (day, week, month, all)")),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
            Granularity::All => "all",
        };
        f.write_str(label)
    }
}

/// Per-bucket tallies. `counts` keeps emotions in the order they were first
/// seen in the bucket, which is the order exports list them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartPoint {
    pub bucket: String,
    pub counts: Vec<(Emotion, usize)>,
}

impl ChartPoint {
    pub fn new(bucket: String) -> Self {
        Self {
            bucket,
            counts: Vec::new(),
        }
    }

    pub fn add(&mut self, emotion: Emotion, n: usize) {
        match self.counts.iter_mut().find(|(seen, _)| *seen == emotion) {
            Some((_, count)) => *count += n,
            None => self.counts.push((emotion, n)),
        }
    }

    pub fn count(&self, emotion: Emotion) -> usize {
        self.counts
            .iter()
            .find(|(seen, _)| *seen == emotion)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().map(|(_, count)| count).sum()
    }
}

// Flat `{ "bucket": ..., "<label>": n }` shape, one key per emotion present.
impl Serialize for ChartPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.counts.len() + 1))?;
        map.serialize_entry("bucket", &self.bucket)?;
        for (emotion, count) in &self.counts {
            map.serialize_entry(emotion.label(), count)?;
        }
        map.end()
    }
}
