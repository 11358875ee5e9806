use {
    anyhow::Context,
    casecrypt_protocol::SymmetricKey,
    casecrypt_sdk::context::{DOCUMENT_KEY_VAR, MASTER_KEY_VAR},
};

fn main() -> anyhow::Result<()> {
    // Exits non-zero only when the OS random source fails; there is no key to print then.
    let key = SymmetricKey::generate().context("failed to generate a key")?;
    let hex = key.to_unmasked_hex();
    println!("{hex}");
    println!();
    println!("Put the key into the environment or the config file, for example:");
    println!("  {DOCUMENT_KEY_VAR}={hex}");
    println!("Run this tool again for a separate {MASTER_KEY_VAR}. Never reuse one key for both.");
    Ok(())
}
