//! Variable table that loaded scripts write into.
//!
//! The remote endpoints answer with small scripts instead of plain data: they
//! either assign a literal to a well-known variable (`var apidata = {...};`)
//! or invoke a callback (`jsonpgz({...});`). [`GlobalScope`] evaluates just
//! those two statement forms. Assignments land in a shared table; calls are
//! delivered to a callback registered under that name, and dropped when no
//! callback is registered anymore.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::oneshot;
use tracing::{debug, trace};

lazy_static! {
    static ref ASSIGNMENT_REGEX: Regex = Regex::new(
        r"^(?:(?:var|let|const)\s+)?(?:window\.)?([A-Za-z_$][A-Za-z0-9_$]*)\s*=([^=][\s\S]*)$"
    )
    .expect("Invalid regex pattern");
    static ref CALL_REGEX: Regex =
        Regex::new(r"^(?:window\.)?([A-Za-z_$][A-Za-z0-9_$]*)\s*\(([\s\S]*)\)$")
            .expect("Invalid regex pattern");
}

struct Registration {
    id: u64,
    sender: oneshot::Sender<String>,
}

#[derive(Default)]
struct ScopeState {
    vars: HashMap<String, String>,
    callbacks: HashMap<String, Registration>,
}

/// Shared scope of script-assigned variables and registered callbacks.
#[derive(Clone, Default)]
pub struct GlobalScope {
    inner: Arc<Mutex<ScopeState>>,
    next_id: Arc<AtomicU64>,
}

impl GlobalScope {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScopeState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs the top-level statements of a script body against the scope.
    pub fn evaluate(&self, body: &str) {
        for statement in split_statements(body) {
            if let Some(caps) = ASSIGNMENT_REGEX.captures(&statement) {
                let name = caps[1].to_string();
                let value = caps[2].trim().to_string();
                trace!(variable = %name, "Script assignment");
                self.lock().vars.insert(name, value);
            } else if let Some(caps) = CALL_REGEX.captures(&statement) {
                let name = &caps[1];
                let args = caps[2].trim().to_string();
                match self.lock().callbacks.remove(name) {
                    Some(registration) => {
                        debug!(callback = name, "Delivering script callback");
                        let _ = registration.sender.send(args);
                    }
                    None => debug!(callback = name, "Ignoring call to unregistered callback"),
                }
            }
        }
    }

    /// Raw literal text assigned to `name`.
    pub fn var(&self, name: &str) -> Option<String> {
        self.lock().vars.get(name).cloned()
    }

    pub fn take_var(&self, name: &str) -> Option<String> {
        self.lock().vars.remove(name)
    }

    pub fn clear_vars(&self, names: &[&str]) {
        let mut state = self.lock();
        for name in names {
            state.vars.remove(*name);
        }
    }

    pub fn has_callback(&self, name: &str) -> bool {
        self.lock().callbacks.contains_key(name)
    }

    /// Registers a one-shot callback. Any earlier registration under the same
    /// name is replaced. The registration is removed when the returned guard
    /// is dropped.
    pub fn register_callback(&self, name: &str) -> CallbackGuard {
        let (sender, receiver) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .callbacks
            .insert(name.to_string(), Registration { id, sender });
        CallbackGuard {
            scope: self.clone(),
            name: name.to_string(),
            id,
            receiver,
        }
    }
}

/// Live callback registration.
pub struct CallbackGuard {
    scope: GlobalScope,
    name: String,
    id: u64,
    receiver: oneshot::Receiver<String>,
}

impl CallbackGuard {
    /// Arguments the callback was invoked with, if it has been invoked.
    pub fn try_take(&mut self) -> Option<String> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for CallbackGuard {
    fn drop(&mut self) {
        let mut state = self.scope.lock();
        // Only remove our own registration, never a newer one with the same name.
        if state
            .callbacks
            .get(&self.name)
            .is_some_and(|registration| registration.id == self.id)
        {
            state.callbacks.remove(&self.name);
        }
    }
}

/// Splits a script into top-level statements on `;`, skipping comments and
/// leaving string literals and bracketed expressions intact.
fn split_statements(body: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut depth: usize = 0;
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' | '\'' | '`' => {
                current.push(c);
                while let Some(inner) = chars.next() {
                    current.push(inner);
                    if inner == '\\' {
                        if let Some(escaped) = chars.next() {
                            current.push(escaped);
                        }
                    } else if inner == c {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for inner in chars.by_ref() {
                    if prev == '*' && inner == '/' {
                        break;
                    }
                    prev = inner;
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        current.push('\n');
                        break;
                    }
                }
            }
            '(' | '[' | '{' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' | '}' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ';' if depth == 0 => {
                push_statement(&mut statements, &mut current);
            }
            _ => current.push(c),
        }
    }
    push_statement(&mut statements, &mut current);
    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        statements.push(trimmed.to_string());
    }
    current.clear();
}

/// Decodes a JS string literal (single, double or backtick quoted).
pub fn decode_string(raw: &str) -> Option<String> {
    let (value, consumed) = read_string_literal(raw.trim())?;
    if raw.trim()[consumed..].trim().is_empty() {
        Some(value)
    } else {
        None
    }
}

/// Decodes a JSON literal.
pub fn decode_json(raw: &str) -> Option<Value> {
    serde_json::from_str(raw.trim()).ok()
}

/// Reads the string value of `field` out of an object literal whose keys may
/// be unquoted, e.g. `{ content:"<table>...", curyear:2024 }`.
pub fn object_string_field(raw: &str, field: &str) -> Option<String> {
    let pattern = format!(r#"[{{,]\s*["']?{}["']?\s*:\s*"#, regex::escape(field));
    let regex = Regex::new(&pattern).ok()?;
    let found = regex.find(raw)?;
    read_string_literal(&raw[found.end()..]).map(|(value, _)| value)
}

/// Reads a quoted literal at the start of `input`, returning the decoded text
/// and the number of bytes consumed.
fn read_string_literal(input: &str) -> Option<(String, usize)> {
    let mut chars = input.char_indices();
    let (_, quote) = chars.next()?;
    if !matches!(quote, '"' | '\'' | '`') {
        return None;
    }

    let mut out = String::new();
    while let Some((idx, c)) = chars.next() {
        if c == quote {
            return Some((out, idx + c.len_utf8()));
        }
        if c != '\\' {
            out.push(c);
            continue;
        }
        let (_, escaped) = chars.next()?;
        match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            '0' => out.push('\0'),
            'u' => {
                let hex: String = (0..4).filter_map(|_| chars.next().map(|(_, h)| h)).collect();
                let code = u32::from_str_radix(&hex, 16).ok()?;
                out.push(char::from_u32(code).unwrap_or('\u{fffd}'));
            }
            '\n' => {}
            other => out.push(other),
        }
    }
    None
}
