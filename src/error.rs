use thiserror::Error;

/// 차선 검출 파이프라인 전반에서 사용하는 에러 타입입니다.
///
/// 프레임 단위의 일시적 실패(`UnderdeterminedFit`)와 스트림 단위의 치명적 실패
/// (`SourceUnavailable`)를 호출부가 구분할 수 있도록 variant로 나눠 둡니다.
#[derive(Error, Debug)]
pub enum LaneError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("underdetermined fit: {distinct} distinct rows, at least {required} required")]
    UnderdeterminedFit { distinct: usize, required: usize },

    #[error("video source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
}

/// 파이프라인 함수들에서 공통으로 사용할 `Result` 타입 별칭입니다.
pub type LaneDetectionResult<T> = Result<T, LaneError>;
