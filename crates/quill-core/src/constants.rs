//! Protocol constants for the target ledger.

/// Asset id of the governance token (NEO), canonical hex (big-endian display order).
pub const NEO_ASSET_ID: &str = "c56f33fc6ecfcd0c225c4ab356fee59390af8560be0e930faebe74a6daff7c9b";

/// Asset id of the utility token (GAS), canonical hex (big-endian display order).
pub const GAS_ASSET_ID: &str = "602c79718b16e442de58778e148d0b1084e3b2dffd5de6b7b16cee7969282de7";

/// Fixed-point scale: one whole coin in raw units.
pub const COIN: u64 = 100_000_000;

/// Address version byte prepended before Base58Check encoding.
pub const ADDRESS_VERSION: u8 = 0x17;

/// WIF version byte.
pub const WIF_VERSION: u8 = 0x80;

/// WIF compressed-key suffix flag.
pub const WIF_COMPRESSED_FLAG: u8 = 0x01;

/// NEP-2 record header bytes.
pub const NEP2_HEADER: [u8; 2] = [0x01, 0x42];

/// NEP-2 flag byte (compressed key, EC-multiplied mode off).
pub const NEP2_FLAG: u8 = 0xe0;

/// scrypt cost parameter, log2(N) with N = 16384.
pub const SCRYPT_LOG_N: u8 = 14;

/// scrypt block size parameter.
pub const SCRYPT_R: u32 = 8;

/// scrypt parallelism parameter.
pub const SCRYPT_P: u32 = 8;

/// scrypt derived key length in bytes.
pub const SCRYPT_DKLEN: usize = 64;

/// Transaction type byte: contract (transfer) transaction.
pub const TX_TYPE_CONTRACT: u8 = 0x80;

/// Transaction type byte: claim transaction.
pub const TX_TYPE_CLAIM: u8 = 0x02;

/// Transaction type byte: invocation transaction.
pub const TX_TYPE_INVOCATION: u8 = 0xd1;
