// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Tests for the error type.

#[cfg(test)]
mod tests {
    use crate::error::AmberError;

    #[test]
    fn test_display_formats() {
        assert_eq!(AmberError::NotFound.to_string(), "not found");
        assert_eq!(
            AmberError::corruption("bad magic").to_string(),
            "corruption: bad magic"
        );
        assert_eq!(
            AmberError::invalid("expect integer").to_string(),
            "invalid argument: expect integer"
        );
        assert_eq!(AmberError::OutOfMemory.to_string(), "out of memory");
    }

    #[test]
    fn test_io_wrapping_names_operation() {
        let err = AmberError::io(
            "open_log",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let text = err.to_string();
        assert!(text.contains("open_log"));
        assert!(text.contains("denied"));
    }

    #[test]
    fn test_is_corruption() {
        assert!(AmberError::corruption("x").is_corruption());
        assert!(!AmberError::NotFound.is_corruption());
    }
}
