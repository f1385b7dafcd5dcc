use rdev::{Button, Key};

use crate::models::InputIdentity;

/// Maps an rdev key code to its canonical tracked identity. Left/right
/// modifier variants fold to a single name; keys outside the fixed
/// alphabet (function keys, navigation cluster, backtick, numpad digits)
/// return `None` and are neither paired nor counted.
pub fn identity_for_key(key: Key) -> Option<InputIdentity> {
    let name: &str = match key {
        Key::KeyA => "a",
        Key::KeyB => "b",
        Key::KeyC => "c",
        Key::KeyD => "d",
        Key::KeyE => "e",
        Key::KeyF => "f",
        Key::KeyG => "g",
        Key::KeyH => "h",
        Key::KeyI => "i",
        Key::KeyJ => "j",
        Key::KeyK => "k",
        Key::KeyL => "l",
        Key::KeyM => "m",
        Key::KeyN => "n",
        Key::KeyO => "o",
        Key::KeyP => "p",
        Key::KeyQ => "q",
        Key::KeyR => "r",
        Key::KeyS => "s",
        Key::KeyT => "t",
        Key::KeyU => "u",
        Key::KeyV => "v",
        Key::KeyW => "w",
        Key::KeyX => "x",
        Key::KeyY => "y",
        Key::KeyZ => "z",
        Key::Num0 => "0",
        Key::Num1 => "1",
        Key::Num2 => "2",
        Key::Num3 => "3",
        Key::Num4 => "4",
        Key::Num5 => "5",
        Key::Num6 => "6",
        Key::Num7 => "7",
        Key::Num8 => "8",
        Key::Num9 => "9",
        Key::Minus => "-",
        Key::Equal => "=",
        Key::LeftBracket => "[",
        Key::RightBracket => "]",
        Key::BackSlash | Key::IntlBackslash => "\\",
        Key::SemiColon => ";",
        Key::Quote => "'",
        Key::Comma => ",",
        Key::Dot => ".",
        Key::Slash => "/",
        Key::Space => "space",
        Key::Tab => "tab",
        Key::CapsLock => "capslock",
        Key::ShiftLeft | Key::ShiftRight => "shift",
        Key::ControlLeft | Key::ControlRight => "ctrl",
        Key::Alt | Key::AltGr => "alt",
        Key::MetaLeft | Key::MetaRight => "win",
        Key::Return | Key::KpReturn => "enter",
        Key::Backspace => "backspace",
        Key::Escape => "esc",
        Key::UpArrow => "up",
        Key::DownArrow => "down",
        Key::LeftArrow => "left",
        Key::RightArrow => "right",
        _ => return None,
    };
    InputIdentity::tracked(name)
}

/// Resolves a key-down to a tracked identity, preferring the typed text the
/// hook reports (so Shift+1 counts as `!`, not `1`). Control bytes produced
/// by Ctrl+<letter> resolve to nothing: the `ctrl+<letter>` form exists only
/// for log readability and is not part of the alphabet.
pub fn identity_for_key_press(key: Key, typed: Option<&str>) -> Option<InputIdentity> {
    if let Some(text) = typed {
        let mut chars = text.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if ('\u{1}'..='\u{1a}').contains(&c) {
                return None;
            }
            if !c.is_control() && !c.is_whitespace() {
                let lowered = c.to_lowercase().to_string();
                if let Some(identity) = InputIdentity::tracked(&lowered) {
                    return Some(identity);
                }
            }
        }
    }
    identity_for_key(key)
}

pub fn identity_for_button(button: Button) -> Option<InputIdentity> {
    let name = match button {
        Button::Left => "mouseleft",
        Button::Right => "mouseright",
        Button::Middle => "mousemiddle",
        Button::Unknown(_) => return None,
    };
    InputIdentity::tracked(name)
}

/// Human-readable rendering of the typed text attached to a key event, for
/// debug logging only. Control bytes 0x01..=0x1a render as `ctrl+<letter>`;
/// other unprintables fall back to their escaped form.
pub fn readable_text(raw: &str) -> String {
    let mut chars = raw.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if ('\u{1}'..='\u{1a}').contains(&c) {
            let letter = (b'a' + (c as u8 - 1)) as char;
            return format!("ctrl+{letter}");
        }
        if c.is_control() {
            return c.escape_debug().to_string();
        }
    }
    raw.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_and_digits_map_to_lowercase_chars() {
        assert_eq!(identity_for_key(Key::KeyA).unwrap().as_str(), "a");
        assert_eq!(identity_for_key(Key::Num7).unwrap().as_str(), "7");
        assert_eq!(identity_for_key(Key::Slash).unwrap().as_str(), "/");
    }

    #[test]
    fn modifier_variants_fold_to_one_name() {
        assert_eq!(identity_for_key(Key::ShiftLeft), identity_for_key(Key::ShiftRight));
        assert_eq!(identity_for_key(Key::ShiftLeft).unwrap().as_str(), "shift");
        assert_eq!(identity_for_key(Key::ControlRight).unwrap().as_str(), "ctrl");
        assert_eq!(identity_for_key(Key::AltGr).unwrap().as_str(), "alt");
        assert_eq!(identity_for_key(Key::MetaRight).unwrap().as_str(), "win");
    }

    #[test]
    fn untracked_keys_resolve_to_none() {
        assert_eq!(identity_for_key(Key::F5), None);
        assert_eq!(identity_for_key(Key::Delete), None);
        assert_eq!(identity_for_key(Key::BackQuote), None);
        assert_eq!(identity_for_key(Key::Unknown(255)), None);
    }

    #[test]
    fn typed_text_wins_over_key_code() {
        // Shift+1 reports "!" as the typed text but Num1 as the key code.
        let identity = identity_for_key_press(Key::Num1, Some("!")).unwrap();
        assert_eq!(identity.as_str(), "!");

        let identity = identity_for_key_press(Key::KeyQ, Some("Q")).unwrap();
        assert_eq!(identity.as_str(), "q");
    }

    #[test]
    fn control_bytes_are_not_tracked() {
        assert_eq!(identity_for_key_press(Key::KeyC, Some("\u{3}")), None);
        assert_eq!(readable_text("\u{3}"), "ctrl+c");
        assert_eq!(readable_text("\u{1a}"), "ctrl+z");
        assert_eq!(readable_text("a"), "a");
    }

    #[test]
    fn key_code_fallback_when_no_text() {
        let identity = identity_for_key_press(Key::Return, None).unwrap();
        assert_eq!(identity.as_str(), "enter");
    }

    #[test]
    fn buttons_map_to_mouse_names() {
        assert_eq!(identity_for_button(Button::Left).unwrap().as_str(), "mouseleft");
        assert_eq!(identity_for_button(Button::Right).unwrap().as_str(), "mouseright");
        assert_eq!(identity_for_button(Button::Middle).unwrap().as_str(), "mousemiddle");
        assert_eq!(identity_for_button(Button::Unknown(4)), None);
    }
}
