//! Persian user-facing messages for terminal error frames
//!
//! Every terminal error carries a human-readable Persian message distinct
//! from the internal `errorType`, so the client can display it directly.

/// Upstream did not answer within the allotted time
pub const TIMEOUT: &str = "پاسخ‌گویی سرور بیش از حد طول کشید. لطفاً دوباره تلاش کنید.";

/// Socket-level failure while reaching the upstream
pub const NETWORK_ERROR: &str =
    "اتصال به سرور برقرار نشد. لطفاً اتصال اینترنت خود را بررسی کنید.";

/// Any other connection-establishment failure
pub const CONNECTION_ERROR: &str =
    "در برقراری ارتباط با سرور خطایی رخ داد. لطفاً دوباره تلاش کنید.";

/// Mid-stream reconnection attempts exhausted
pub const STREAMING_FAILED: &str =
    "ارتباط در میانهٔ پاسخ قطع شد و تلاش‌های مجدد نتیجه‌ای نداشت. لطفاً دوباره تلاش کنید.";

/// Non-retryable mid-stream failure
pub const STREAM_ERROR: &str = "در دریافت پاسخ خطایی رخ داد. لطفاً دوباره تلاش کنید.";

/// Per-user credit exhausted (business error, never retried)
pub const NO_CREDIT: &str =
    "اعتبار شما به پایان رسیده است. برای ادامهٔ گفتگو حساب خود را شارژ کنید.";

/// Generic upstream business failure
pub const UPSTREAM_FAILURE: &str = "سرویس پاسخ‌گو با خطا مواجه شد. لطفاً بعداً تلاش کنید.";

/// Request rejected because no valid session is present
pub const UNAUTHORIZED: &str = "برای ادامه ابتدا وارد حساب کاربری خود شوید.";

/// Credential sign-in denied
pub const INVALID_CREDENTIALS: &str = "شماره موبایل یا رمز عبور نادرست است.";
