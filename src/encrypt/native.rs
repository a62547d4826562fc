use log::debug;
use pgp::{
    crypto::sym::SymmetricKeyAlgorithm, types::PublicKeyTrait, ArmorOptions, Deserializable,
    Message, SignedPublicKey,
};

use super::{ArmoredMessage, EncryptError, EncryptionStrategy, EphemeralKeyring, RecipientKeyId};

const KEY_FILE: &str = "pubring.asc";

/// Encrypts in process with the `pgp` crate
pub struct NativeOpenPgp;

impl EncryptionStrategy for NativeOpenPgp {
    fn name(&self) -> &str {
        "embedded OpenPGP"
    }

    fn import_key(
        &self,
        keyring: &EphemeralKeyring,
        key_material: &str,
    ) -> Result<Vec<String>, EncryptError> {
        let keys = parse_keys(key_material)?;
        for key in &keys {
            key.verify().map_err(|e| {
                EncryptError::KeyImport(format!(
                    "signatures of key {} are invalid: {e}",
                    hex_id(key)
                ))
            })?;
        }
        keyring.write_file(KEY_FILE, key_material)?;
        Ok(keys.iter().flat_map(key_ids).collect())
    }

    fn encrypt(
        &self,
        keyring: &EphemeralKeyring,
        plaintext: &str,
        recipient: &RecipientKeyId,
    ) -> Result<ArmoredMessage, EncryptError> {
        let keys = parse_keys(&keyring.read_file(KEY_FILE)?)?;
        let message = Message::new_literal("", plaintext);
        let mut rng = rand::thread_rng();
        let alg = SymmetricKeyAlgorithm::AES128;

        let encrypted = match select_target(&keys, recipient)? {
            Target::Subkey(key, index) => {
                let subkey = &keys[key].public_subkeys[index];
                debug!("Encrypting to subkey {}", hex_id(subkey));
                message.encrypt_to_keys_seipdv1(&mut rng, alg, &[subkey])
            }
            Target::Primary(key) => {
                let key = &keys[key];
                debug!("Encrypting to primary key {}", hex_id(key));
                message.encrypt_to_keys_seipdv1(&mut rng, alg, &[key])
            }
        }
        .map_err(|e| EncryptError::Encryption {
            status: "encryption to recipient key failed".to_string(),
            diagnostic: e.to_string(),
        })?;

        let armored = encrypted
            .to_armored_string(ArmorOptions::default())
            .map_err(|e| EncryptError::Encryption {
                status: "armoring failed".to_string(),
                diagnostic: e.to_string(),
            })?;
        ArmoredMessage::new(armored)
    }
}

/// Every public key in the armored block, in the order they appear
fn parse_keys(key_material: &str) -> Result<Vec<SignedPublicKey>, EncryptError> {
    let parse_error =
        |e: pgp::errors::Error| EncryptError::KeyImport(format!("failed to parse public key: {e}"));
    let (keys, _headers) =
        SignedPublicKey::from_armor_many(key_material.as_bytes()).map_err(parse_error)?;
    let keys = keys.collect::<Result<Vec<_>, _>>().map_err(parse_error)?;
    if keys.is_empty() {
        return Err(EncryptError::KeyImport(
            "key block contains no public key".to_string(),
        ));
    }
    Ok(keys)
}

fn hex_id(key: &impl PublicKeyTrait) -> String {
    hex::encode_upper(key.key_id())
}

/// Primary key ID followed by the subkey IDs
fn key_ids(key: &SignedPublicKey) -> Vec<String> {
    std::iter::once(hex_id(key))
        .chain(key.public_subkeys.iter().map(hex_id))
        .collect()
}

/// Index of the key in the block, and of the subkey within it
#[derive(Debug, PartialEq, Eq)]
enum Target {
    Primary(usize),
    Subkey(usize, usize),
}

/// Picks the key to encrypt to the way gpg does: a named subkey is used directly, naming the
/// primary key selects its first encryption capable subkey.
fn select_target(
    keys: &[SignedPublicKey],
    recipient: &RecipientKeyId,
) -> Result<Target, EncryptError> {
    for (position, key) in keys.iter().enumerate() {
        if let Some(target) = select_in_key(key, recipient)? {
            return Ok(match target {
                Target::Primary(_) => Target::Primary(position),
                Target::Subkey(_, index) => Target::Subkey(position, index),
            });
        }
    }
    Err(EncryptError::Encryption {
        status: format!("no public key for {recipient}"),
        diagnostic: format!(
            "imported keys: {}",
            keys.iter().flat_map(key_ids).collect::<Vec<_>>().join(", ")
        ),
    })
}

/// `None` when `recipient` names neither this key nor one of its subkeys
fn select_in_key(
    key: &SignedPublicKey,
    recipient: &RecipientKeyId,
) -> Result<Option<Target>, EncryptError> {
    let subkeys = &key.public_subkeys;
    if let Some(index) = subkeys.iter().position(|k| recipient.matches(&hex_id(k))) {
        return if subkeys[index].is_encryption_key() {
            Ok(Some(Target::Subkey(0, index)))
        } else {
            Err(no_encryption_key(recipient))
        };
    }

    if !recipient.matches(&hex_id(key)) {
        return Ok(None);
    }

    if let Some(index) = subkeys.iter().position(|k| k.is_encryption_key()) {
        Ok(Some(Target::Subkey(0, index)))
    } else if key.is_encryption_key() {
        Ok(Some(Target::Primary(0)))
    } else {
        Err(no_encryption_key(recipient))
    }
}

fn no_encryption_key(recipient: &RecipientKeyId) -> EncryptError {
    EncryptError::Encryption {
        status: format!("key {recipient} is not usable for encryption"),
        diagnostic: String::new(),
    }
}
