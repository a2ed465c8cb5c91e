/// Where the mutable value of a line lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSlot {
    /// no `keyword: value` form, an update replaces the whole line
    WholeLine,
    /// index of the token following the last `keyword:` token, may be past the end
    Token(usize),
}

/// value reported for a line ending in `keyword:`
pub const MISSING_VALUE: &str = "NONE";

/// A single line of a template configuration file
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigLine {
    text: String,
    tokens: Vec<String>,
    keyword: String,
    slot: ValueSlot,
    value: String,
    disabled: bool,
}

impl ConfigLine {
    /// parse a line, a leading `;` marks the line as disabled
    pub fn parse(line: &str) -> Self {
        let (disabled, text) = match line.strip_prefix(';') {
            Some(rest) => (true, rest),
            None => (false, line),
        };

        let tokens = tokenize(text);
        let keyword = tokens
            .first()
            .map(|token| extract_keyword(token))
            .unwrap_or_default();

        // a colon followed by whitespace marks the token after the last `key:` as the value
        let slot = if has_colon_separator(text) {
            tokens
                .iter()
                .rposition(|token| token.ends_with(':'))
                .map_or(ValueSlot::WholeLine, |index| ValueSlot::Token(index + 1))
        } else {
            ValueSlot::WholeLine
        };

        let value = match slot {
            // a trailing `key:` has no value yet, updates replace the whole line
            ValueSlot::Token(index) => tokens
                .get(index)
                .map_or_else(|| MISSING_VALUE.to_owned(), String::clone),
            ValueSlot::WholeLine => text.to_owned(),
        };

        Self {
            text: text.to_owned(),
            tokens,
            keyword,
            slot,
            value,
            disabled,
        }
    }

    /// replace the value of the line, `reenable` clears the disabled flag
    pub fn update(&mut self, value: &str, reenable: bool) {
        if reenable {
            self.disabled = false;
        }

        match self.slot {
            ValueSlot::Token(index) if index < self.tokens.len() => {
                self.tokens[index] = value.to_owned();
            }
            _ => {
                self.slot = ValueSlot::WholeLine;
                self.tokens = tokenize(value);
            }
        }

        self.text = self.tokens.join(" ");
        self.value = value.to_owned();
    }

    pub fn render(&self) -> String {
        if self.disabled {
            format!(";{}", self.text)
        } else {
            self.text.clone()
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn value(&self) -> &str {
        &self.value
    }

}

#[cfg(test)]
impl ConfigLine {
    pub fn slot(&self) -> ValueSlot {
        self.slot
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_owned).collect()
}

/// leading run of letters, commas, hyphens and underscores after any `;` or spaces
fn extract_keyword(token: &str) -> String {
    token
        .trim_start_matches([';', ' '])
        .chars()
        .take_while(|c| c.is_ascii_alphabetic() || matches!(c, ',' | '-' | '_'))
        .collect()
}

fn has_colon_separator(text: &str) -> bool {
    text.char_indices().any(|(index, c)| {
        c == ':'
            && text[index + 1..]
                .chars()
                .next()
                .map_or(false, char::is_whitespace)
    })
}
