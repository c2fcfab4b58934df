// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod address;
pub mod cancel;
pub mod time;

pub use address::{is_hex_address, is_hex_handle, parse_address, to_checksum_string};
pub use cancel::{check_cancelled, run_cancellable};
pub use time::{unix_now, SECONDS_PER_DAY};
