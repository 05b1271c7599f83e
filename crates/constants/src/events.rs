//! Event name constants used as `tracing` field values.

pub const EVENT_LFC_OPEN: &str = "lfc.open";
pub const EVENT_LFC_CLOSE: &str = "lfc.close";
pub const EVENT_LFC_CLEAR: &str = "lfc.clear";
pub const EVENT_LFC_GET_FILE: &str = "lfc.get_file";
pub const EVENT_LFC_UPDATE: &str = "lfc.update";
pub const EVENT_LFC_EVICT: &str = "lfc.evict";

pub const EVENT_PCF_ACCRUE: &str = "pcf.accrue";
pub const EVENT_PCF_RELEASE: &str = "pcf.release";
pub const EVENT_PCF_READ: &str = "pcf.read";
pub const EVENT_PCF_FETCH: &str = "pcf.fetch";

pub const EVENT_CHC_GET_FILE: &str = "chc.get_file";
pub const EVENT_CHC_DOWNLOAD: &str = "chc.download_file";
pub const EVENT_CHC_GET_JSON: &str = "chc.get_as_json";

pub const EVENT_PROXY_REQUEST: &str = "proxy.request";
