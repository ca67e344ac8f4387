use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;

use crossterm::event::KeyCode;
use crossterm::event::KeyEvent;
use crossterm::event::KeyModifiers;

/// Actions that can be rebound from the `[keys]` table of `config.toml`.
pub const KEYBINDING_ACTIONS: &[&str] = &[
    "send",
    "newline",
    "stop",
    "quit",
    "copy_code",
    "scroll_up",
    "scroll_down",
];

fn default_bindings() -> BTreeMap<&'static str, Vec<&'static str>> {
    BTreeMap::from([
        ("send", vec!["enter"]),
        ("newline", vec!["alt+enter", "shift+enter", "ctrl+j"]),
        ("stop", vec!["esc"]),
        ("quit", vec!["ctrl+c"]),
        ("copy_code", vec!["ctrl+y"]),
        ("scroll_up", vec!["pageup"]),
        ("scroll_down", vec!["pagedown"]),
    ])
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct KeyChord {
    pub key: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeyChord {
    pub fn matches(&self, event: KeyEvent) -> bool {
        if event.code == self.key && event.modifiers == self.modifiers {
            return true;
        }
        // Terminals disagree on whether ctrl/alt letters arrive shifted.
        if let (KeyCode::Char(expected), KeyCode::Char(actual)) = (self.key, event.code)
            && self
                .modifiers
                .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
        {
            let mut mods = event.modifiers;
            mods.remove(KeyModifiers::SHIFT);
            return mods == self.modifiers && expected.eq_ignore_ascii_case(&actual);
        }
        false
    }

    fn normalized(&self) -> (KeyModifiers, KeyCode) {
        match self.key {
            KeyCode::Char(ch) => (self.modifiers, KeyCode::Char(ch.to_ascii_lowercase())),
            key => (self.modifiers, key),
        }
    }
}

impl fmt::Display for KeyChord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.modifiers.contains(KeyModifiers::CONTROL) {
            parts.push("ctrl".to_string());
        }
        if self.modifiers.contains(KeyModifiers::ALT) {
            parts.push("alt".to_string());
        }
        if self.modifiers.contains(KeyModifiers::SHIFT) {
            parts.push("shift".to_string());
        }
        parts.push(match self.key {
            KeyCode::Enter => "enter".to_string(),
            KeyCode::Esc => "esc".to_string(),
            KeyCode::Tab => "tab".to_string(),
            KeyCode::PageUp => "pgup".to_string(),
            KeyCode::PageDown => "pgdn".to_string(),
            KeyCode::Char(' ') => "space".to_string(),
            KeyCode::Char(ch) => ch.to_ascii_lowercase().to_string(),
            KeyCode::F(num) => format!("f{num}"),
            key => format!("{key:?}").to_ascii_lowercase(),
        });
        write!(f, "{}", parts.join("+"))
    }
}

#[derive(Clone, Debug, Default)]
pub struct KeyBindingSet(pub Vec<KeyChord>);

impl KeyBindingSet {
    pub fn matches(&self, event: KeyEvent) -> bool {
        self.0.iter().any(|chord| chord.matches(event))
    }

    /// First chord, for footer hints.
    pub fn primary(&self) -> Option<&KeyChord> {
        self.0.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeymapError {
    UnknownAction(String),
    InvalidChord {
        action: String,
        chord: String,
        message: String,
    },
    Conflict {
        chord: String,
        actions: Vec<String>,
    },
}

impl fmt::Display for KeymapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeymapError::UnknownAction(action) => {
                write!(f, "unknown keybinding action '{action}'")
            }
            KeymapError::InvalidChord {
                action,
                chord,
                message,
            } => write!(f, "invalid keybinding '{chord}' for '{action}': {message}"),
            KeymapError::Conflict { chord, actions } => {
                write!(f, "keybinding conflict: {chord} used by {}", actions.join(" and "))
            }
        }
    }
}

impl std::error::Error for KeymapError {}

#[derive(Debug, Clone)]
pub struct ChatKeymap {
    pub send: KeyBindingSet,
    pub newline: KeyBindingSet,
    pub stop: KeyBindingSet,
    /// Stops a running reply first; quits when idle.
    pub quit: KeyBindingSet,
    pub copy_code: KeyBindingSet,
    pub scroll_up: KeyBindingSet,
    pub scroll_down: KeyBindingSet,
}

impl ChatKeymap {
    /// Defaults with `overrides` (action name to chords) applied on top.
    pub fn from_overrides(overrides: &BTreeMap<String, Vec<String>>) -> Result<Self, KeymapError> {
        let mut merged: HashMap<String, Vec<String>> = default_bindings()
            .into_iter()
            .map(|(action, chords)| {
                (
                    action.to_string(),
                    chords.into_iter().map(str::to_string).collect(),
                )
            })
            .collect();
        for (action, chords) in overrides {
            if !KEYBINDING_ACTIONS.contains(&action.as_str()) {
                return Err(KeymapError::UnknownAction(action.clone()));
            }
            merged.insert(action.clone(), chords.clone());
        }

        let mut sets = HashMap::new();
        for (action, chords) in merged {
            let mut set = Vec::with_capacity(chords.len());
            for chord in chords {
                let parsed = parse_key_chord(&chord).map_err(|message| {
                    KeymapError::InvalidChord {
                        action: action.clone(),
                        chord: chord.clone(),
                        message,
                    }
                })?;
                set.push(parsed);
            }
            sets.insert(action, KeyBindingSet(set));
        }
        validate_conflicts(&sets)?;

        let mut take = |action: &str| {
            sets.remove(action)
                .ok_or_else(|| KeymapError::UnknownAction(action.to_string()))
        };
        Ok(Self {
            send: take("send")?,
            newline: take("newline")?,
            stop: take("stop")?,
            quit: take("quit")?,
            copy_code: take("copy_code")?,
            scroll_up: take("scroll_up")?,
            scroll_down: take("scroll_down")?,
        })
    }
}

fn validate_conflicts(sets: &HashMap<String, KeyBindingSet>) -> Result<(), KeymapError> {
    let mut used: HashMap<(KeyModifiers, KeyCode), Vec<String>> = HashMap::new();
    for (action, set) in sets {
        for chord in &set.0 {
            used.entry(chord.normalized())
                .or_default()
                .push(action.clone());
        }
    }
    for ((modifiers, key), mut actions) in used {
        if actions.len() > 1 {
            actions.sort();
            return Err(KeymapError::Conflict {
                chord: KeyChord { key, modifiers }.to_string(),
                actions,
            });
        }
    }
    Ok(())
}

fn parse_key_chord(input: &str) -> Result<KeyChord, String> {
    let raw = input.trim();
    if raw.is_empty() {
        return Err("empty key chord".to_string());
    }

    let mut modifiers = KeyModifiers::NONE;
    let mut key: Option<KeyCode> = None;
    for part in raw.split('+').map(str::trim) {
        if part.is_empty() {
            return Err("empty chord segment".to_string());
        }
        match part.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => modifiers |= KeyModifiers::CONTROL,
            "alt" | "option" => modifiers |= KeyModifiers::ALT,
            "shift" => modifiers |= KeyModifiers::SHIFT,
            _ => {
                if key.is_some() {
                    return Err("multiple non-modifier keys in chord".to_string());
                }
                key = Some(parse_keycode(part)?);
            }
        }
    }

    let key = key.ok_or_else(|| "missing key in chord".to_string())?;
    Ok(KeyChord { key, modifiers })
}

fn parse_keycode(part: &str) -> Result<KeyCode, String> {
    let lower = part.to_ascii_lowercase();
    let code = match lower.as_str() {
        "enter" | "return" => KeyCode::Enter,
        "esc" | "escape" => KeyCode::Esc,
        "tab" => KeyCode::Tab,
        "backspace" => KeyCode::Backspace,
        "delete" => KeyCode::Delete,
        "space" => KeyCode::Char(' '),
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "pageup" | "pgup" => KeyCode::PageUp,
        "pagedown" | "pgdn" => KeyCode::PageDown,
        _ => {
            if let Some(n) = lower.strip_prefix('f').and_then(|num| num.parse::<u8>().ok()) {
                return Ok(KeyCode::F(n));
            }
            let mut chars = part.chars();
            match (chars.next(), chars.next()) {
                (Some(ch), None) => KeyCode::Char(ch),
                _ => return Err(format!("unknown key '{part}'")),
            }
        }
    };
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn overrides(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(action, chords)| {
                (
                    (*action).to_string(),
                    chords.iter().map(|chord| (*chord).to_string()).collect(),
                )
            })
            .collect()
    }

    fn defaults() -> ChatKeymap {
        match ChatKeymap::from_overrides(&BTreeMap::new()) {
            Ok(keymap) => keymap,
            Err(err) => panic!("defaults should be valid: {err}"),
        }
    }

    #[test]
    fn defaults_bind_enter_to_send() {
        let keymap = defaults();
        assert!(
            keymap
                .send
                .matches(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE))
        );
        assert!(
            keymap
                .newline
                .matches(KeyEvent::new(KeyCode::Enter, KeyModifiers::ALT))
        );
        assert!(
            !keymap
                .send
                .matches(KeyEvent::new(KeyCode::Enter, KeyModifiers::ALT))
        );
    }

    #[test]
    fn ctrl_letters_match_regardless_of_shift_and_case() {
        let keymap = defaults();
        assert!(
            keymap
                .copy_code
                .matches(KeyEvent::new(KeyCode::Char('Y'), KeyModifiers::CONTROL | KeyModifiers::SHIFT))
        );
    }

    #[test]
    fn overrides_replace_defaults() -> Result<(), KeymapError> {
        let keymap = ChatKeymap::from_overrides(&overrides(&[("stop", &["ctrl+g"])]))?;
        assert!(
            keymap
                .stop
                .matches(KeyEvent::new(KeyCode::Char('g'), KeyModifiers::CONTROL))
        );
        assert!(
            !keymap
                .stop
                .matches(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE))
        );
        Ok(())
    }

    #[test]
    fn unknown_actions_are_rejected() {
        let err = ChatKeymap::from_overrides(&overrides(&[("explode", &["ctrl+x"])])).err();
        assert_eq!(err, Some(KeymapError::UnknownAction("explode".to_string())));
    }

    #[test]
    fn invalid_chords_are_rejected() {
        let err = ChatKeymap::from_overrides(&overrides(&[("send", &["ctrl+"])]));
        assert!(matches!(err, Err(KeymapError::InvalidChord { .. })));
    }

    #[test]
    fn conflicting_bindings_are_rejected() {
        let err = ChatKeymap::from_overrides(&overrides(&[("copy_code", &["Ctrl+C"])])).err();
        assert_eq!(
            err,
            Some(KeymapError::Conflict {
                chord: "ctrl+c".to_string(),
                actions: vec!["copy_code".to_string(), "quit".to_string()],
            })
        );
    }

    #[test]
    fn chords_display_in_lowercase() {
        let keymap = defaults();
        assert_eq!(
            keymap.copy_code.primary().map(ToString::to_string),
            Some("ctrl+y".to_string())
        );
        assert_eq!(
            keymap.scroll_up.primary().map(ToString::to_string),
            Some("pgup".to_string())
        );
    }
}
