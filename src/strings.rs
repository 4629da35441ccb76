//! Caller-owned string buffer for variable-length results.

/// Holds a string returned across the boundary.
///
/// The caller creates the holder, passes it to a query such as
/// [`RenderHost::session_status`](crate::RenderHost::session_status), reads
/// it and drops it when done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringHolder {
    value: String,
}

impl StringHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> &str {
        &self.value
    }

    pub(crate) fn set(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_value() {
        let mut holder = StringHolder::new();
        assert_eq!(holder.get(), "");
        holder.set("Rendering");
        holder.set("Done");
        assert_eq!(holder.get(), "Done");
    }
}
