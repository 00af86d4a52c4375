use crossterm::event::KeyEvent;
use ratatui::style::{Modifier, Style};
use tui_textarea::{CursorMove, Input, TextArea};

/// Single-line input used for the SQL bar, `:` commands and cell edits.
pub struct Prompt {
    pub active: bool,
    pub textarea: TextArea<'static>,
}

impl Prompt {
    pub fn new() -> Self {
        Self {
            active: false,
            textarea: new_textarea(""),
        }
    }

    /// Activate with `initial` as the text, cursor at the end.
    pub fn open(&mut self, initial: &str) {
        self.active = true;
        self.set_text(initial);
    }

    pub fn close(&mut self) {
        self.active = false;
    }

    pub fn text(&self) -> String {
        self.textarea.lines().join(" ")
    }

    pub fn set_text(&mut self, s: &str) {
        self.textarea = new_textarea(s);
    }

    /// Feed a key to the text area. Newlines never enter the text.
    pub fn input(&mut self, key: KeyEvent) {
        let input = Input::from(key);
        if input.key == tui_textarea::Key::Enter {
            return;
        }
        self.textarea.input(input);
    }

    /// Insert pasted text, flattening line breaks.
    pub fn insert_str(&mut self, s: &str) {
        let flat: String = s
            .chars()
            .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
            .collect();
        self.textarea.insert_str(flat);
    }
}

impl Default for Prompt {
    fn default() -> Self {
        Self::new()
    }
}

fn new_textarea(s: &str) -> TextArea<'static> {
    let line: String = s.lines().collect::<Vec<_>>().join(" ");
    let mut textarea = TextArea::new(vec![line]);
    textarea.set_cursor_line_style(Style::default().add_modifier(Modifier::UNDERLINED));
    textarea.move_cursor(CursorMove::End);
    textarea
}
