//! 分页参数处理

use tonic::Status;

/// 默认分页大小
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// 最大分页大小
pub const MAX_PAGE_SIZE: usize = 1000;

/// 规范化请求中的 page_size
///
/// - `0` 使用默认值
/// - 负数返回 `INVALID_ARGUMENT`
/// - 超过上限时截断为上限
pub fn page_size(requested: i32, default: usize, max: usize) -> Result<usize, Status> {
    match requested {
        n if n < 0 => Err(Status::invalid_argument(format!(
            "page_size must be non-negative, got {n}"
        ))),
        0 => Ok(default.min(max)),
        n => Ok((n as usize).min(max)),
    }
}

/// 使用默认上下限的 [`page_size`]
pub fn default_page_size(requested: i32) -> Result<usize, Status> {
    page_size(requested, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::Code;

    #[test]
    fn test_page_size() {
        assert_eq!(default_page_size(0).unwrap(), DEFAULT_PAGE_SIZE);
        assert_eq!(default_page_size(10).unwrap(), 10);
        assert_eq!(default_page_size(5000).unwrap(), MAX_PAGE_SIZE);
        assert_eq!(page_size(0, 50, 20).unwrap(), 20);
        assert_eq!(
            default_page_size(-1).unwrap_err().code(),
            Code::InvalidArgument
        );
    }
}
