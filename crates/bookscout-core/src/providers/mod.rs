// Catalog provider implementations
pub mod kakao;

pub use kakao::KakaoProvider;
