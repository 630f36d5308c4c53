use crate::CallerResult;

/// Configuration sections validate themselves after loading.
pub trait ConfigValidator {
    fn validate(&self) -> CallerResult<()>;
}
