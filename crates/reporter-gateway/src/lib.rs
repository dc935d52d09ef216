pub mod dispatcher;
pub mod rate_limit;
pub mod telegram;
pub mod translate;
pub mod url_analyzer;
