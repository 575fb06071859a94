/// Classification for retry policy.
///
/// Used by the resolver and by callers to decide whether an error is worth
/// retrying later. The resolver itself never retries the same provider within
/// one request; every provider-level failure moves on to the next provider.
///
/// # Behavior Summary
///
/// | Class | Try Next Provider? | Worth Retrying This Provider Later? |
/// |-------|-------------------|-------------------------------------|
/// | `Never` | n/a (request-level) | No |
/// | `Transient` | Yes | Yes (quota window, 429, timeout) |
/// | `Permanent` | Yes | No (bad key, unknown symbol, bad payload) |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// The request itself is invalid or already terminal.
    /// Invalid symbol, aggregated failure, cache rejection.
    Never,

    /// Quota exhaustion, HTTP 429, timeout or network failure.
    /// The same provider may succeed once its window resets or the network recovers.
    Transient,

    /// Missing/placeholder/invalid key, unknown symbol, malformed payload.
    /// Retrying the same provider with the same input will fail again.
    Permanent,
}
