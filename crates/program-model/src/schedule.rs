//! Schedules: the content a composition's text overlays are resolved from.

use serde::{Deserialize, Serialize};

/// One broadcast item: what is being discussed and who takes part.
///
/// A schedule is treated as immutable for the lifetime of a composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    /// Unique schedule identifier.
    pub id: String,

    /// Owning plan, whose defaults layouts inherit.
    #[serde(default)]
    pub plan_id: Option<String>,

    /// Topic under discussion.
    #[serde(default)]
    pub topic: String,

    /// Procedure / agenda step title, if any.
    #[serde(default)]
    pub procedure: Option<String>,

    /// Hosts, in display order.
    #[serde(default)]
    pub hosts: Vec<Person>,

    /// Guests, in display order.
    #[serde(default)]
    pub guests: Vec<Person>,
}

/// A participant shown on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,

    /// Role or affiliation shown after the name.
    #[serde(default)]
    pub title: Option<String>,
}

impl Person {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Display form: `Name (Title)` or just `Name`.
    pub fn display(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => format!("{} ({})", self.name, title),
            _ => self.name.clone(),
        }
    }
}

impl Schedule {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            plan_id: None,
            topic: String::new(),
            procedure: None,
            hosts: Vec::new(),
            guests: Vec::new(),
        }
    }

    /// Host names formatted for display, one entry per host.
    pub fn host_lines(&self) -> Vec<String> {
        self.hosts.iter().map(Person::display).collect()
    }

    /// Guest names formatted for display, one entry per guest.
    pub fn guest_lines(&self) -> Vec<String> {
        self.guests.iter().map(Person::display).collect()
    }

    /// Topic followed by the procedure title, skipping blanks.
    pub fn subject_lines(&self) -> Vec<String> {
        std::iter::once(self.topic.as_str())
            .chain(self.procedure.as_deref())
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_person_display_skips_blank_title() {
        assert_eq!(Person::new("Ada").display(), "Ada");
        assert_eq!(Person::new("Ada").with_title("  ").display(), "Ada");
        assert_eq!(
            Person::new("Ada").with_title("Chair").display(),
            "Ada (Chair)"
        );
    }

    #[test]
    fn test_subject_lines_include_procedure() {
        let mut schedule = Schedule::new("s1");
        schedule.topic = "Budget review".to_string();
        assert_eq!(schedule.subject_lines(), vec!["Budget review"]);

        schedule.procedure = Some("Second reading".to_string());
        assert_eq!(
            schedule.subject_lines(),
            vec!["Budget review", "Second reading"]
        );
    }
}
