//! Errors - executor から返るエラーと分類
//!
//! scheduler はどの executor エラーも同じに扱う（breaker の失敗に数える）。
//! `ErrorKind` は、不安定な backend と受け付けられないリクエストをログ上で
//! 見分けるためだけにある。

use std::fmt;

/// ErrorKind は実行エラーの分類
///
/// - Transient: 一時的なエラー（backend の過負荷、接続断など）
/// - Permanent: 恒久的なエラー（不正な workflow、payload の不備）
/// - Infrastructure: インフラエラー（GPU / ストレージの障害）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Infrastructure => "infrastructure",
        };
        f.write_str(s)
    }
}

/// ExecutionError は `TaskExecutor` が 1 回の実行について返す失敗
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ExecutionError {
    kind: ErrorKind,
    message: String,
}

impl ExecutionError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Permanent, message)
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Infrastructure, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_the_bare_message() {
        let err = ExecutionError::infrastructure("CUDA out of memory");
        assert_eq!(err.to_string(), "CUDA out of memory");
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
        assert_eq!(err.kind().to_string(), "infrastructure");
    }
}
