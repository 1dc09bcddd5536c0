//! # Firmware Status Codes
//!
//! The 24-bit status field of a reply header and its descriptions.

use core::fmt;

/// Firmware reply status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FwStatus(u32);

impl FwStatus {
    /// The operation was successful
    pub const SUCCESS: Self = Self(0);
    /// Invalid parameter specified
    pub const INVALID_PARAM: Self = Self(1);
    /// Unknown message type specified
    pub const UNKNOWN_MESSAGE: Self = Self(2);
    /// The system or resource is busy
    pub const BUSY: Self = Self(4);
    /// Unsupported operation requested
    pub const UNSUPPORTED: Self = Self(7);
    /// Specified resource not found
    pub const NOT_FOUND: Self = Self(9);
    /// Resource id already assigned
    pub const ALREADY_EXISTS: Self = Self(10);
    /// Required resource is in invalid state
    pub const INVALID_STATE: Self = Self(12);
    /// Module loading failed
    pub const MODULE_LOAD_FAILED: Self = Self(101);
    /// Other failure of module instance initialization
    pub const MODULE_INIT_FAILED: Self = Self(104);
    /// Invalid module id
    pub const INVALID_MODULE_ID: Self = Self(110);
    /// Invalid module instance id
    pub const INVALID_INSTANCE_ID: Self = Self(111);
    /// Invalid queue (pin) id
    pub const INVALID_QUEUE_ID: Self = Self(112);

    /// Wrap a raw status, keeping the low 24 bits
    pub const fn new(raw: u32) -> Self {
        Self(raw & 0x00FF_FFFF)
    }

    /// Raw status value
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Whether the firmware accepted the request
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Table description, if the code is known
    pub fn description(self) -> Option<&'static str> {
        STATUS_TABLE
            .binary_search_by_key(&self.0, |&(code, _)| code)
            .ok()
            .map(|idx| STATUS_TABLE[idx].1)
    }
}

impl fmt::Display for FwStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.description() {
            Some(text) => write!(f, "{} (status {})", text, self.0),
            None => write!(f, "unknown firmware error (status {})", self.0),
        }
    }
}

/// Known status codes, sorted by code
static STATUS_TABLE: &[(u32, &str)] = &[
    (0, "The operation was successful"),
    (1, "Invalid parameter specified"),
    (2, "Unknown message type specified"),
    (3, "Not enough space in the IPC reply buffer to complete the request"),
    (4, "The system or resource is busy"),
    (5, "Replaced ADSP IPC PENDING (unused)"),
    (6, "Unknown error while processing the request"),
    (7, "Unsupported operation requested"),
    (8, "Reserved (ADSP_STAGE_UNINITIALIZED removed)"),
    (9, "Specified resource not found"),
    (10, "A resource's ID requested to be created is already assigned"),
    (11, "Reserved (ADSP_IPC_OUT_OF_MIPS removed)"),
    (12, "Required resource is in invalid state"),
    (13, "Requested power transition failed to complete"),
    (14, "Manifest of the library being loaded is invalid"),
    (15, "Requested service or data is unavailable on the target platform"),
    (42, "Library target address is out of storage memory range"),
    (43, "Reserved"),
    (44, "Image verification by CSE failed"),
    (100, "General module management error"),
    (101, "Module loading failed"),
    (102, "Integrity check of the loaded module content failed"),
    (103, "Attempt to unload code of the module in use"),
    (104, "Other failure of module instance initialization request"),
    (105, "Reserved (ADSP_IPC_OUT_OF_MIPS removed)"),
    (106, "Reserved (ADSP_IPC_CONFIG_GET_ERROR removed)"),
    (107, "Reserved (ADSP_IPC_CONFIG_SET_ERROR removed)"),
    (108, "Reserved (ADSP_IPC_LARGE_CONFIG_GET_ERROR removed)"),
    (109, "Reserved (ADSP_IPC_LARGE_CONFIG_SET_ERROR removed)"),
    (110, "Invalid (out of range) module ID provided"),
    (111, "Invalid module instance ID provided"),
    (112, "Invalid queue (pin) ID provided"),
    (113, "Invalid destination queue (pin) ID provided"),
    (114, "Reserved (ADSP_IPC_BIND_UNBIND_DST_SINK_UNSUPPORTED removed)"),
    (115, "Reserved (ADSP_IPC_UNLOAD_INST_EXISTS removed)"),
    (116, "Invalid target code ID provided"),
    (117, "Injection DMA buffer is too small for probing the input pin"),
    (118, "Extraction DMA buffer is too small for probing the output pin"),
    (120, "Invalid ID of configuration item provided in TLV list"),
    (121, "Invalid length of configuration item provided in TLV list"),
    (122, "Invalid structure of configuration item provided"),
    (140, "Initialization of DMA Gateway failed"),
    (141, "Invalid ID of gateway provided"),
    (142, "Setting state of DMA Gateway failed"),
    (143, "DMA_CONTROL message targeting gateway not allocated yet"),
    (150, "Attempt to configure SCLK while I2S port is running"),
    (151, "Attempt to configure MCLK while I2S port is running"),
    (152, "Attempt to stop SCLK that is not running"),
    (153, "Attempt to stop MCLK that is not running"),
    (160, "Reserved (ADSP_IPC_PIPELINE_NOT_INITIALIZED removed)"),
    (161, "Reserved (ADSP_IPC_PIPELINE_NOT_EXIST removed)"),
    (162, "Reserved (ADSP_IPC_PIPELINE_SAVE_FAILED removed)"),
    (163, "Reserved (ADSP_IPC_PIPELINE_RESTORE_FAILED removed)"),
    (164, "Reverted for ULP purposes"),
    (165, "Reserved (ADSP_IPC_PIPELINE_ALREADY_EXISTS removed)"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_table_sorted() {
        assert!(STATUS_TABLE.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_not_found_description() {
        let status = FwStatus::new(9);
        assert_eq!(status, FwStatus::NOT_FOUND);
        assert!(status.to_string().contains("resource not found"));
    }

    #[test]
    fn test_unknown_code() {
        let status = FwStatus::new(77);
        assert!(status.description().is_none());
        assert_eq!(status.to_string(), "unknown firmware error (status 77)");
    }

    #[test]
    fn test_masks_to_24_bits() {
        assert_eq!(FwStatus::new(0xFF00_0004), FwStatus::BUSY);
        assert!(FwStatus::new(0x0100_0000).is_success());
    }
}
