//! Greeting recognition for candidate serial links
//!
//! The firmware announces itself with [`GREETING_MARKER`] and waits for a
//! role byte. After the host answers [`ROLE_REPLY`] the firmware repeats the
//! marker followed by [`GREETING_END`], which commits the link.
//!
//! Bytes are matched raw. Until the marker has been seen, everything a
//! candidate sent must be a substring of the full greeting; anything else
//! rejects the candidate at once instead of waiting for its watchdog.

/// Text the firmware prints when it is ready
pub const GREETING_MARKER: &[u8] = b"protocol:\"r or d?\"\n";

/// Byte that ends the confirming greeting
pub const GREETING_END: u8 = 0xFF;

/// Role byte sent back after the marker
pub const ROLE_REPLY: u8 = b'r';

/// What to do with a candidate after feeding it input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreetingStep {
    /// Full greeting received; commit to this link
    Accept,
    /// A new marker arrived; answer with the role byte
    Reply,
    /// Consistent so far; keep listening
    Pending,
    /// Not the rig; dispose the candidate
    Reject,
}

/// Accumulates one candidate's greeting bytes
#[derive(Debug, Clone)]
pub struct GreetingMatcher {
    buffer: Vec<u8>,
    replies: usize,
    max_len: usize,
}

impl GreetingMatcher {
    /// Matcher that rejects after `max_len` bytes without a full greeting
    pub fn new(max_len: usize) -> Self {
        Self {
            buffer: Vec::new(),
            replies: 0,
            max_len,
        }
    }

    /// Full greeting: marker plus end byte
    pub fn greeting() -> Vec<u8> {
        let mut greeting = GREETING_MARKER.to_vec();
        greeting.push(GREETING_END);
        greeting
    }

    /// Feed newly read bytes
    pub fn feed(&mut self, input: &[u8]) -> GreetingStep {
        self.buffer.extend_from_slice(input);
        let greeting = Self::greeting();

        if contains(&self.buffer, &greeting) {
            return GreetingStep::Accept;
        }
        if self.buffer.len() > self.max_len {
            return GreetingStep::Reject;
        }

        let markers = count(&self.buffer, GREETING_MARKER);
        if markers > self.replies {
            self.replies = markers;
            return GreetingStep::Reply;
        }
        if self.replies > 0 || contains(&greeting, &self.buffer) {
            GreetingStep::Pending
        } else {
            GreetingStep::Reject
        }
    }

    /// Bytes buffered so far
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty() || haystack.windows(needle.len()).any(|w| w == needle)
}

fn count(haystack: &[u8], needle: &[u8]) -> usize {
    if needle.is_empty() || haystack.len() < needle.len() {
        return 0;
    }
    let mut n = 0;
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if &haystack[i..i + needle.len()] == needle {
            n += 1;
            i += needle.len();
        } else {
            i += 1;
        }
    }
    n
}
