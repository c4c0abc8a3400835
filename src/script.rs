use std::{collections::HashMap, fmt};

/// Every variable this tool reads or writes carries this prefix.
pub const VAR_PREFIX: &str = "SCRIPT_";
/// If this variable is assigned, the whole script is left alone.
pub const SKIP_VAR: &str = "SCRIPT_SKIP";
/// A script can declare up to this many upstream repositories.
pub const MAX_SLOTS: usize = 9;

/// The name of a slot variable, e.g. `SCRIPT_REPO` for the first slot and `SCRIPT_REPO3` for the third.
pub fn var_name(base: &str, index: usize) -> String {
    if index <= 1 {
        format!("{VAR_PREFIX}{base}")
    } else {
        format!("{VAR_PREFIX}{base}{index}")
    }
}

/// The version control system, decided by which revision variable a slot pins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Vcs {
    Svn,
    Hg,
    Git,
}

impl Vcs {
    /// Revision variables in the order they are looked up, the first assigned one wins.
    pub const PRECEDENCE: [Vcs; 3] = [Vcs::Svn, Vcs::Hg, Vcs::Git];

    /// The unsuffixed, unprefixed name of the revision variable.
    pub fn base(&self) -> &'static str {
        match self {
            Vcs::Svn => "REV",
            Vcs::Hg => "HGREV",
            Vcs::Git => "COMMIT",
        }
    }
}

impl fmt::Display for Vcs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Vcs::Svn => "svn rev",
            Vcs::Hg => "hg rev",
            Vcs::Git => "git commit",
        })
    }
}

/// The currently recorded revision of a slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pin {
    pub vcs: Vcs,
    pub current: String,
}

/// One upstream repository declared in a script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slot {
    /// 1-based, the first slot has no suffix.
    pub index: usize,
    pub repo: String,
    /// `None` if the slot has a repository but no known revision variable.
    pub pin: Option<Pin>,
    pub branch: Option<String>,
    pub tag_filter: Option<String>,
}

impl Slot {
    /// The name of the variable holding the pinned revision.
    pub fn revision_var(&self) -> Option<String> {
        self.pin
            .as_ref()
            .map(|pin| var_name(pin.vcs.base(), self.index))
    }
}

/// Lines appended to a script that needs a human to look at it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Marker {
    /// The script doesn't declare a first repository.
    MissingRepository,
    /// A repository is declared without a revision variable we know.
    UnknownLayout,
}

impl Marker {
    pub fn line(&self) -> &'static str {
        match self {
            Marker::MissingRepository => "xxx_CHECKME_xxx",
            Marker::UnknownLayout => "xxx_CHECKME_UNKNOWN_xxx",
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.line())
    }
}

/// Split text into lines, keeping the line ending (`\n`, `\r\n` or nothing) apart from the body.
fn split_lines(content: &str) -> impl Iterator<Item = (&str, &str)> {
    content.split_inclusive('\n').map(|line| {
        if let Some(body) = line.strip_suffix("\r\n") {
            (body, "\r\n")
        } else if let Some(body) = line.strip_suffix('\n') {
            (body, "\n")
        } else {
            (line, "")
        }
    })
}

/// Parse a `NAME="VALUE"` or `NAME='VALUE'` line.
///
/// The name has to start the line, the value cannot contain its own quote character.
fn parse_assignment(line: &str) -> Option<(&str, &str)> {
    let (name, rest) = line.split_once('=')?;
    if name.is_empty() || !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return None;
    }

    let rest = rest.trim_end();
    let quote = rest.chars().next().filter(|ch| *ch == '"' || *ch == '\'')?;
    let value = rest[1..].strip_suffix(quote)?;
    if value.contains(quote) {
        return None;
    }

    Some((name, value))
}

/// The text of a script with its variable assignments.
///
/// Everything that is not an assignment is kept byte-for-byte, including the line endings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Script {
    content: String,
    vars: HashMap<String, String>,
}

impl Script {
    pub fn parse(content: impl Into<String>) -> Self {
        let content = content.into();
        let vars = split_lines(&content)
            .filter_map(|(line, _)| parse_assignment(line))
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();

        Script { content, vars }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn into_content(self) -> String {
        self.content
    }

    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }

    /// The value of the variable, if it is assigned. Duplicate assignments resolve to the last one.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|value| !value.is_empty())
    }

    pub fn is_skipped(&self) -> bool {
        self.vars.contains_key(SKIP_VAR)
    }

    /// Load the slot with the given index, `None` if it doesn't declare a repository.
    pub fn slot(&self, index: usize) -> Option<Slot> {
        let repo = self.get_non_empty(&var_name("REPO", index))?;

        let pin = Vcs::PRECEDENCE.iter().find_map(|vcs| {
            self.get_non_empty(&var_name(vcs.base(), index))
                .map(|current| Pin {
                    vcs: *vcs,
                    current: current.to_string(),
                })
        });

        Some(Slot {
            index,
            repo: repo.to_string(),
            pin,
            branch: self
                .get_non_empty(&var_name("BRANCH", index))
                .map(String::from),
            tag_filter: self
                .get_non_empty(&var_name("TAGFILTER", index))
                .map(String::from),
        })
    }

    /// The declared slots, stopping at the first one without a repository.
    pub fn slots(&self) -> Vec<Slot> {
        (1..=MAX_SLOTS).map_while(|index| self.slot(index)).collect()
    }

    /// Rewrite the assignment of `name` to `name="value"`.
    ///
    /// Only the line that [Script::get] reads from is changed. Returns false and changes
    /// nothing if the variable is not assigned in the script.
    pub fn set(&mut self, name: &str, value: &str) -> bool {
        let Some(target) = split_lines(&self.content)
            .enumerate()
            .filter(|(_, (line, _))| matches!(parse_assignment(line), Some((found, _)) if found == name))
            .map(|(i, _)| i)
            .last()
        else {
            return false;
        };

        let mut updated = String::with_capacity(self.content.len());
        for (i, (line, ending)) in split_lines(&self.content).enumerate() {
            if i == target {
                updated.push_str(&format!("{name}=\"{value}\""));
            } else {
                updated.push_str(line);
            }
            updated.push_str(ending);
        }

        self.content = updated;
        self.vars.insert(name.to_string(), value.to_string());
        true
    }

    pub fn has_marker(&self, marker: Marker) -> bool {
        split_lines(&self.content).any(|(line, _)| line == marker.line())
    }

    /// Append the marker on its own line after a blank line. Returns false if it was already there.
    pub fn append_marker(&mut self, marker: Marker) -> bool {
        if self.has_marker(marker) {
            return false;
        }
        self.content.push('\n');
        self.content.push_str(marker.line());
        self.content.push('\n');
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"#!/bin/bash

SCRIPT_REPO="https://github.com/madler/zlib.git"
SCRIPT_COMMIT='51b7f2abdade71cd9bb0e7a373ef2610ec6f9daf'
SCRIPT_TAGFILTER="v1.*"

ffbuild_enabled() {
    SCRIPT_COMMIT=$(cat VERSION)
    return 0
}
"#;

    #[test]
    fn it_should_create_variable_names_with_suffix() {
        assert_eq!("SCRIPT_REPO", var_name("REPO", 1));
        assert_eq!("SCRIPT_REPO2", var_name("REPO", 2));
        assert_eq!("SCRIPT_HGREV9", var_name("HGREV", 9));
    }

    #[test]
    fn it_should_parse_quoted_assignments() {
        let script = Script::parse(SCRIPT);

        assert_eq!(
            Some("https://github.com/madler/zlib.git"),
            script.get("SCRIPT_REPO")
        );
        assert_eq!(
            Some("51b7f2abdade71cd9bb0e7a373ef2610ec6f9daf"),
            script.get("SCRIPT_COMMIT")
        );
        assert_eq!(Some("v1.*"), script.get("SCRIPT_TAGFILTER"));
        assert_eq!(3, script.vars().len());
    }

    #[test]
    fn it_should_ignore_lines_that_are_not_assignments() {
        let script = Script::parse(
            "  SCRIPT_REPO=\"indented\"\nSCRIPT_REV=123\nSCRIPT_BRANCH=\"a\"b\"\nSCRIPT_HGREV=\"mixed'\n# SCRIPT_SKIP=\"1\"\n",
        );

        assert!(script.vars().is_empty());
    }

    #[test]
    fn it_should_take_the_last_duplicate() {
        let script = Script::parse("SCRIPT_REV=\"1\"\nSCRIPT_REV=\"2\"\n");

        assert_eq!(Some("2"), script.get("SCRIPT_REV"));
    }

    #[test]
    fn it_should_change_exactly_one_line() {
        let mut script = Script::parse(SCRIPT);

        assert!(script.set("SCRIPT_COMMIT", "0123456789abcdef0123456789abcdef01234567"));

        let before: Vec<&str> = SCRIPT.lines().collect();
        let after: Vec<&str> = script.content().lines().collect();
        assert_eq!(before.len(), after.len());
        let changed: Vec<usize> = (0..before.len())
            .filter(|i| before[*i] != after[*i])
            .collect();
        assert_eq!(vec![3], changed);
        assert_eq!(
            "SCRIPT_COMMIT=\"0123456789abcdef0123456789abcdef01234567\"",
            after[3]
        );
        assert_eq!(
            Some("0123456789abcdef0123456789abcdef01234567"),
            script.get("SCRIPT_COMMIT")
        );
    }

    #[test]
    fn it_should_keep_line_endings() {
        let mut script = Script::parse("a\r\nSCRIPT_REV=\"1\"\r\nb\nc");

        assert!(script.set("SCRIPT_REV", "2"));
        assert_eq!("a\r\nSCRIPT_REV=\"2\"\r\nb\nc", script.content());
    }

    #[test]
    fn it_should_only_rewrite_the_effective_duplicate() {
        let mut script = Script::parse("SCRIPT_REV=\"1\"\nSCRIPT_REV=\"2\"\n");

        assert!(script.set("SCRIPT_REV", "3"));
        assert_eq!("SCRIPT_REV=\"1\"\nSCRIPT_REV=\"3\"\n", script.content());
    }

    #[test]
    fn it_should_not_set_missing_variables() {
        let mut script = Script::parse(SCRIPT);

        assert!(!script.set("SCRIPT_REV", "42"));
        assert_eq!(SCRIPT, script.content());
        assert_eq!(None, script.get("SCRIPT_REV"));
    }

    #[test]
    fn it_should_keep_unchanged_content() {
        let script = Script::parse(SCRIPT);

        assert_eq!(SCRIPT, script.into_content());
    }

    #[test]
    fn it_should_load_slots_with_their_backend() {
        let script = Script::parse(
            "SCRIPT_REPO=\"https://svn.example.org/trunk\"\nSCRIPT_REV=\"1234\"\nSCRIPT_REPO2=\"https://hg.example.org/x\"\nSCRIPT_HGREV2=\"abcdef012345\"\nSCRIPT_REPO3=\"https://git.example.org/y\"\nSCRIPT_COMMIT3=\"abc\"\nSCRIPT_BRANCH3=\"stable\"\n",
        );

        let slots = script.slots();
        assert_eq!(3, slots.len());
        assert_eq!(Some(Vcs::Svn), slots[0].pin.as_ref().map(|pin| pin.vcs));
        assert_eq!(Some(Vcs::Hg), slots[1].pin.as_ref().map(|pin| pin.vcs));
        assert_eq!(Some(Vcs::Git), slots[2].pin.as_ref().map(|pin| pin.vcs));
        assert_eq!(Some(String::from("stable")), slots[2].branch);
        assert_eq!(Some(String::from("SCRIPT_COMMIT3")), slots[2].revision_var());
    }

    #[test]
    fn it_should_stop_at_the_first_missing_slot() {
        let script = Script::parse(
            "SCRIPT_REPO=\"a\"\nSCRIPT_COMMIT=\"1\"\nSCRIPT_REPO3=\"c\"\nSCRIPT_COMMIT3=\"3\"\n",
        );

        let slots = script.slots();
        assert_eq!(1, slots.len());
        assert_eq!("a", slots[0].repo);
    }

    #[test]
    fn it_should_prefer_svn_then_hg_then_git() {
        let script = Script::parse(
            "SCRIPT_REPO=\"a\"\nSCRIPT_COMMIT=\"c\"\nSCRIPT_HGREV=\"h\"\nSCRIPT_REV=\"\"\n",
        );

        let slot = script.slot(1).unwrap();
        assert_eq!(
            Some(Pin {
                vcs: Vcs::Hg,
                current: String::from("h")
            }),
            slot.pin
        );
    }

    #[test]
    fn it_should_leave_slots_without_revision_unpinned() {
        let script = Script::parse("SCRIPT_REPO=\"a\"\n");

        let slot = script.slot(1).unwrap();
        assert_eq!(None, slot.pin);
        assert_eq!(None, slot.revision_var());
    }

    #[test]
    fn it_should_detect_the_skip_variable() {
        assert!(Script::parse("SCRIPT_SKIP=\"1\"\n").is_skipped());
        assert!(Script::parse("SCRIPT_SKIP=''\n").is_skipped());
        assert!(!Script::parse(SCRIPT).is_skipped());
    }

    #[test]
    fn it_should_append_markers_once() {
        let mut script = Script::parse("#!/bin/sh\n");

        assert!(script.append_marker(Marker::MissingRepository));
        assert!(!script.append_marker(Marker::MissingRepository));
        assert_eq!("#!/bin/sh\n\nxxx_CHECKME_xxx\n", script.content());

        assert!(script.append_marker(Marker::UnknownLayout));
        assert!(script.has_marker(Marker::UnknownLayout));
    }
}
