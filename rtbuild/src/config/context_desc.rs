/// Configuration descriptor for an [`RtasContext`](crate::RtasContext).
#[derive(Debug, Clone)]
pub struct RtasContextDesc {
    /// Number of worker threads in the build pool (None uses hardware concurrency)
    pub max_concurrency: Option<usize>,
    /// Prefix for worker thread names; the worker index is appended
    pub thread_name_prefix: String,
    /// Optional stack size per worker thread in bytes
    pub stack_size: Option<usize>,
    /// Gate device queries on known vendor/device IDs.
    ///
    /// When disabled every device reports format version 1, which is what a
    /// host-only build without a device driver needs.
    pub require_supported_device: bool,
}

impl Default for RtasContextDesc {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            thread_name_prefix: "rtbuild-worker".to_string(),
            stack_size: None,
            require_supported_device: true,
        }
    }
}

impl RtasContextDesc {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_concurrency(mut self, workers: usize) -> Self {
        self.max_concurrency = Some(workers);
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    pub fn require_supported_device(mut self, require: bool) -> Self {
        self.require_supported_device = require;
        self
    }

    /// Resolves the worker count, falling back to the available hardware parallelism.
    pub fn resolved_concurrency(&self) -> usize {
        self.max_concurrency
            .filter(|&n| n > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_concurrency() {
        let desc = RtasContextDesc::new().max_concurrency(3);
        assert_eq!(desc.resolved_concurrency(), 3);
    }

    #[test]
    fn test_zero_concurrency_falls_back() {
        let desc = RtasContextDesc::new().max_concurrency(0);
        assert!(desc.resolved_concurrency() >= 1);
    }
}
