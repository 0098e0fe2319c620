//! Bitcoin transaction layer
//!
//! Everything the channel needs from Bitcoin itself: the redeem script codec,
//! P2SH address derivation, signing, time lock policy and transaction
//! validation. Nothing in this module knows about channel sessions.

pub mod address;
pub mod redeem_script;
pub mod script;
pub mod sighash;
pub mod state;
pub mod timelock;
pub mod validation;

pub use address::{derive_address, p2sh_script_pubkey, parse_address, script_hash};
pub use redeem_script::{
    parse_redeem_script, public_key_from_hex, public_key_from_slice, RedeemScript,
    RedeemScriptParams,
};
pub use script::{detect_script_type, ScriptType};
pub use state::UnspentOutput;
pub use timelock::{lock_time_after, unix_now, validate_channel_lock_time};
pub use validation::{
    check_transaction, transaction_fee, verify_bitcoin_transaction, verify_input_script,
    CHANNEL_SCRIPT_FLAGS,
};
