use serde::{Deserialize, Serialize};

/// Chat-platform actor (user) id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub i64);

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chat-platform chat (group or private) id.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message id as assigned by the chat platform, unique within a chat.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PlatformMessageId(pub i64);

/// Error raised when a string is not exactly 10 ASCII digits.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("expected exactly 10 ASCII digits, got {0:?}")]
pub struct InvalidDigits(pub String);

fn check_ten_digits(s: &str) -> Result<(), InvalidDigits> {
    if s.len() == 10 && s.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(InvalidDigits(s.to_string()))
    }
}

/// The 10-digit identifier embedded in free text that is the unit of
/// search and reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectToken(String);

impl SubjectToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for SubjectToken {
    type Err = InvalidDigits;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        check_ten_digits(s)?;
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for SubjectToken {
    type Error = InvalidDigits;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        check_ten_digits(&s)?;
        Ok(Self(s))
    }
}

impl From<SubjectToken> for String {
    fn from(t: SubjectToken) -> String {
        t.0
    }
}

impl std::fmt::Display for SubjectToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The 10-digit identifier naming a registered chat group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectGroupId(String);

impl SubjectGroupId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for SubjectGroupId {
    type Err = InvalidDigits;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        check_ten_digits(s)?;
        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for SubjectGroupId {
    type Error = InvalidDigits;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        check_ten_digits(&s)?;
        Ok(Self(s))
    }
}

impl From<SubjectGroupId> for String {
    fn from(g: SubjectGroupId) -> String {
        g.0
    }
}

impl std::fmt::Display for SubjectGroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role tier of an actor, from most to least privileged.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RoleTier {
    Owner,
    Superadmin,
    Admin,
    /// Allow-listed regular user.
    Allowed,
    Guest,
}

impl RoleTier {
    /// Admins and above can manage groups, legends and allow-lists.
    pub fn is_admin(self) -> bool {
        matches!(self, RoleTier::Owner | RoleTier::Superadmin | RoleTier::Admin)
    }

    /// Superadmin-only operations (admin roster, unregistration).
    pub fn is_superadmin(self) -> bool {
        matches!(self, RoleTier::Owner | RoleTier::Superadmin)
    }

    /// Daily quotas apply only below the allow-listed tier.
    pub fn is_quota_exempt(self) -> bool {
        !matches!(self, RoleTier::Guest)
    }
}

/// Interface language preference.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum Lang {
    #[default]
    Ru,
    Uk,
}

impl Lang {
    pub fn code(self) -> &'static str {
        match self {
            Lang::Ru => "ru",
            Lang::Uk => "uk",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "ru" => Some(Lang::Ru),
            "uk" => Some(Lang::Uk),
            _ => None,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Lang::Ru => Lang::Uk,
            Lang::Uk => Lang::Ru,
        }
    }
}

/// Time window applied to a search.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimeFilter {
    #[default]
    All,
    Last24h,
}

impl TimeFilter {
    /// Wire code used in continuation cursors.
    pub fn code(self) -> &'static str {
        match self {
            TimeFilter::All => "all",
            TimeFilter::Last24h => "24h",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "all" => Some(TimeFilter::All),
            "24h" => Some(TimeFilter::Last24h),
            _ => None,
        }
    }
}

/// A category of gated action, each with its own daily limit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum QuotaKind {
    Search,
    ReportSend,
    LegendView,
}

impl QuotaKind {
    pub fn code(self) -> &'static str {
        match self {
            QuotaKind::Search => "search",
            QuotaKind::ReportSend => "report-send",
            QuotaKind::LegendView => "legend-view",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "search" => Some(QuotaKind::Search),
            "report-send" => Some(QuotaKind::ReportSend),
            "legend-view" => Some(QuotaKind::LegendView),
            _ => None,
        }
    }
}

/// Media attachment kind carried alongside message text.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[default]
    Text,
    Photo,
    Video,
    Audio,
    Voice,
    Document,
}

impl MediaKind {
    pub fn code(self) -> &'static str {
        match self {
            MediaKind::Text => "text",
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Voice => "voice",
            MediaKind::Document => "document",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "text" => Some(MediaKind::Text),
            "photo" => Some(MediaKind::Photo),
            "video" => Some(MediaKind::Video),
            "audio" => Some(MediaKind::Audio),
            "voice" => Some(MediaKind::Voice),
            "document" => Some(MediaKind::Document),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_token_requires_ten_digits() {
        assert!("1234567890".parse::<SubjectToken>().is_ok());
        assert!("123456789".parse::<SubjectToken>().is_err());
        assert!("12345678901".parse::<SubjectToken>().is_err());
        assert!("12345a7890".parse::<SubjectToken>().is_err());
    }

    #[test]
    fn time_filter_codes_round_trip() {
        for tf in [TimeFilter::All, TimeFilter::Last24h] {
            assert_eq!(TimeFilter::from_code(tf.code()), Some(tf));
        }
        assert_eq!(TimeFilter::from_code("week"), None);
    }

    #[test]
    fn role_tier_privileges() {
        assert!(RoleTier::Owner.is_superadmin());
        assert!(RoleTier::Admin.is_admin());
        assert!(!RoleTier::Admin.is_superadmin());
        assert!(RoleTier::Allowed.is_quota_exempt());
        assert!(!RoleTier::Guest.is_quota_exempt());
    }
}
