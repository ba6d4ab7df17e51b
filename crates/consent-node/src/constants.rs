pub(crate) const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub(crate) const DEFAULT_LEDGER_PATH: &str = "./data/ledger.json";
pub(crate) const MAX_BODY_BYTES: usize = 64 * 1024;
