//! On-disk persistence for finalizer safety info.
//!
//! Reference: spec.md §6 "FSI file format"; grounded on
//! `original_source/libraries/chain/finalizer.cpp`'s
//! `save_finalizer_safety_info`/`load_finalizer_safety_info{,_v0,_v1}`.
//!
//! Layout: an 8-byte magic, an 8-byte version, an 8-byte entry count, that
//! many fixed-size entries, and (for version 1) a trailing 4-byte CRC-32
//! over everything before it. Entries for finalizers not configured in
//! this process (left over from a previous configuration) are read back
//! once and re-written byte-for-byte on every save without being
//! re-decoded, so multi-process coordination over a shared key set stays
//! correct even though this process only acts on its own subset.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use shared_types::{BlockRef, BlsPublicKeyBytes, FinalizerSafetyInfo, Hash, Slot};

use crate::error::{FinalityError, FinalityResult};

const MAGIC: u64 = 0x4649_4e5f_5346_5953; // "FIN_SFYS" truncated to 8 bytes
const VERSION_V0: u64 = 0;
const VERSION_V1: u64 = 1;
const CURRENT_VERSION: u64 = VERSION_V1;

const PUBKEY_LEN: usize = 48;
const BLOCK_REF_V0_LEN: usize = 32 + 8 + 32;
const ENTRY_V1_LEN: usize = PUBKEY_LEN + BLOCK_REF_V0_LEN * 2 + 8;
const ENTRY_V0_LEN: usize = PUBKEY_LEN + BLOCK_REF_V0_LEN * 2 + 1;
const CRC_LEN: usize = 4;
const PREAMBLE_LEN: usize = 8 + 8 + 8;

fn encode_block_ref_v0(r: &BlockRef, out: &mut Vec<u8>) {
    out.extend_from_slice(&r.block_id);
    out.extend_from_slice(&r.timestamp.to_le_bytes());
    out.extend_from_slice(&r.finality_digest);
}

/// `block_num` and the policy generation counters are not part of the
/// wire format (see the original's "omitting generation numbers"
/// comment); they play no role in the safety checks, so they come back
/// as zero.
fn decode_block_ref_v0(buf: &[u8]) -> FinalityResult<BlockRef> {
    if buf.len() < BLOCK_REF_V0_LEN {
        return Err(FinalityError::Corrupt("truncated block_ref".into()));
    }
    let mut block_id: Hash = [0u8; 32];
    block_id.copy_from_slice(&buf[0..32]);
    let timestamp = Slot::from_le_bytes(buf[32..40].try_into().unwrap());
    let mut finality_digest: Hash = [0u8; 32];
    finality_digest.copy_from_slice(&buf[40..72]);
    Ok(BlockRef {
        block_id,
        block_num: 0,
        timestamp,
        finality_digest,
        active_policy_generation: 0,
        pending_policy_generation: 0,
    })
}

fn encode_entry_v1(pubkey: &BlsPublicKeyBytes, fsi: &FinalizerSafetyInfo, out: &mut Vec<u8>) {
    out.extend_from_slice(pubkey);
    encode_block_ref_v0(&fsi.last_vote, out);
    encode_block_ref_v0(&fsi.lock, out);
    out.extend_from_slice(&fsi.other_branch_latest_time.to_le_bytes());
}

fn decode_entry_v1(buf: &[u8]) -> FinalityResult<(BlsPublicKeyBytes, FinalizerSafetyInfo)> {
    if buf.len() < ENTRY_V1_LEN {
        return Err(FinalityError::Corrupt("truncated v1 entry".into()));
    }
    let mut pubkey: BlsPublicKeyBytes = [0u8; PUBKEY_LEN];
    pubkey.copy_from_slice(&buf[0..PUBKEY_LEN]);
    let mut offset = PUBKEY_LEN;
    let last_vote = decode_block_ref_v0(&buf[offset..offset + BLOCK_REF_V0_LEN])?;
    offset += BLOCK_REF_V0_LEN;
    let lock = decode_block_ref_v0(&buf[offset..offset + BLOCK_REF_V0_LEN])?;
    offset += BLOCK_REF_V0_LEN;
    let other_branch_latest_time = Slot::from_le_bytes(buf[offset..offset + 8].try_into().unwrap());
    Ok((
        pubkey,
        FinalizerSafetyInfo {
            last_vote,
            lock,
            other_branch_latest_time,
        },
    ))
}

fn decode_entry_v0(buf: &[u8]) -> FinalityResult<(BlsPublicKeyBytes, FinalizerSafetyInfo)> {
    if buf.len() < ENTRY_V0_LEN {
        return Err(FinalityError::Corrupt("truncated v0 entry".into()));
    }
    let mut pubkey: BlsPublicKeyBytes = [0u8; PUBKEY_LEN];
    pubkey.copy_from_slice(&buf[0..PUBKEY_LEN]);
    let mut offset = PUBKEY_LEN;
    let last_vote = decode_block_ref_v0(&buf[offset..offset + BLOCK_REF_V0_LEN])?;
    offset += BLOCK_REF_V0_LEN;
    let lock = decode_block_ref_v0(&buf[offset..offset + BLOCK_REF_V0_LEN])?;
    offset += BLOCK_REF_V0_LEN;
    // v0's trailing field was a bool, `votes_forked_since_latest_strong_vote`.
    let votes_forked = buf[offset] != 0;
    let other_branch_latest_time = if votes_forked { last_vote.timestamp } else { 0 };
    Ok((
        pubkey,
        FinalizerSafetyInfo {
            last_vote,
            lock,
            other_branch_latest_time,
        },
    ))
}

/// An open finalizer safety persistence file, bound to a fixed set of
/// locally-configured public keys.
pub struct FsiStore {
    path: PathBuf,
    configured_keys: Vec<BlsPublicKeyBytes>,
    /// magic + version + count + re-encoded inactive entries, built once
    /// on open and reused unchanged on every save.
    cached_prefix: Vec<u8>,
    cached_prefix_crc: crc32fast::Hasher,
}

impl FsiStore {
    /// Open (or initialize) the safety file at `path` for exactly
    /// `configured_keys`. Returns the store handle plus the safety info
    /// recovered for each configured key (defaulting to
    /// [`FinalizerSafetyInfo::empty`] for keys absent from the file).
    pub fn open(
        path: impl Into<PathBuf>,
        configured_keys: &[BlsPublicKeyBytes],
    ) -> FinalityResult<(FsiStore, HashMap<BlsPublicKeyBytes, FinalizerSafetyInfo>)> {
        let path = path.into();
        let configured: std::collections::HashSet<BlsPublicKeyBytes> = configured_keys.iter().copied().collect();

        let mut active = HashMap::new();
        let mut inactive: Vec<(BlsPublicKeyBytes, FinalizerSafetyInfo)> = Vec::new();

        if path.exists() {
            let bytes = fs::read(&path)?;
            if bytes.len() < PREAMBLE_LEN {
                return Err(FinalityError::Corrupt("file shorter than its preamble".into()));
            }
            let magic = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
            if magic != MAGIC {
                return Err(FinalityError::BadMagic);
            }
            let version = u64::from_le_bytes(bytes[8..16].try_into().unwrap());
            if version > CURRENT_VERSION {
                return Err(FinalityError::UnsupportedVersion {
                    found: version,
                    supported: CURRENT_VERSION,
                });
            }
            let count = u64::from_le_bytes(bytes[16..24].try_into().unwrap()) as usize;

            let entry_len = if version == VERSION_V0 { ENTRY_V0_LEN } else { ENTRY_V1_LEN };
            let mut offset = PREAMBLE_LEN;
            for _ in 0..count {
                if offset + entry_len > bytes.len() {
                    return Err(FinalityError::Corrupt("entry table shorter than its count".into()));
                }
                let (pubkey, fsi) = if version == VERSION_V0 {
                    decode_entry_v0(&bytes[offset..offset + entry_len])?
                } else {
                    decode_entry_v1(&bytes[offset..offset + entry_len])?
                };
                offset += entry_len;

                if configured.contains(&pubkey) {
                    active.insert(pubkey, fsi);
                } else {
                    inactive.push((pubkey, fsi));
                }
            }

            if version == VERSION_V1 {
                if offset + CRC_LEN > bytes.len() {
                    return Err(FinalityError::Corrupt("missing checksum trailer".into()));
                }
                let expected = u32::from_le_bytes(bytes[offset..offset + CRC_LEN].try_into().unwrap());
                let actual = crc32fast::hash(&bytes[..offset]);
                if expected != actual {
                    return Err(FinalityError::BadChecksum);
                }
            }
        }

        for key in configured_keys {
            active.entry(*key).or_insert_with(FinalizerSafetyInfo::empty);
        }

        let mut cached_prefix = Vec::with_capacity(PREAMBLE_LEN + inactive.len() * ENTRY_V1_LEN);
        cached_prefix.extend_from_slice(&MAGIC.to_le_bytes());
        cached_prefix.extend_from_slice(&CURRENT_VERSION.to_le_bytes());
        let total_count = (configured_keys.len() + inactive.len()) as u64;
        cached_prefix.extend_from_slice(&total_count.to_le_bytes());
        for (pubkey, fsi) in &inactive {
            encode_entry_v1(pubkey, fsi, &mut cached_prefix);
        }

        let mut cached_prefix_crc = crc32fast::Hasher::new();
        cached_prefix_crc.update(&cached_prefix);

        let store = FsiStore {
            path,
            configured_keys: configured_keys.to_vec(),
            cached_prefix,
            cached_prefix_crc,
        };
        Ok((store, active))
    }

    /// Persist `active` (keyed by the same public keys passed to
    /// [`open`](Self::open)) to disk, preserving the previously-read
    /// inactive-finalizer prefix untouched.
    pub fn save(&self, active: &HashMap<BlsPublicKeyBytes, FinalizerSafetyInfo>) -> FinalityResult<()> {
        let mut buf = self.cached_prefix.clone();
        let mut crc = self.cached_prefix_crc.clone();

        let mut suffix = Vec::with_capacity(self.configured_keys.len() * ENTRY_V1_LEN);
        for key in &self.configured_keys {
            let fsi = active.get(key).copied().unwrap_or_else(FinalizerSafetyInfo::empty);
            encode_entry_v1(key, &fsi, &mut suffix);
        }
        crc.update(&suffix);
        buf.extend_from_slice(&suffix);
        buf.extend_from_slice(&crc.finalize().to_le_bytes());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp_path = tmp_path_for(&self.path);
        fs::write(&tmp_path, &buf)?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> BlsPublicKeyBytes {
        [byte; PUBKEY_LEN]
    }

    fn sample_fsi(n: u64) -> FinalizerSafetyInfo {
        FinalizerSafetyInfo {
            last_vote: BlockRef {
                block_id: [n as u8; 32],
                block_num: n as u32,
                timestamp: n,
                finality_digest: [n as u8 + 1; 32],
                active_policy_generation: 0,
                pending_policy_generation: 0,
            },
            lock: BlockRef {
                block_id: [n as u8 - 1; 32],
                block_num: n as u32 - 1,
                timestamp: n - 1,
                finality_digest: [0u8; 32],
                active_policy_generation: 0,
                pending_policy_generation: 0,
            },
            other_branch_latest_time: 0,
        }
    }

    #[test]
    fn round_trips_through_save_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fsi.dat");
        let keys = vec![key(1), key(2)];

        let (store, initial) = FsiStore::open(&path, &keys).unwrap();
        assert_eq!(initial.len(), 2);
        assert!(initial.values().all(FinalizerSafetyInfo::is_empty));

        let mut active = initial;
        active.insert(key(1), sample_fsi(10));
        active.insert(key(2), sample_fsi(20));
        store.save(&active).unwrap();

        let (_, reloaded) = FsiStore::open(&path, &keys).unwrap();
        assert_eq!(reloaded.get(&key(1)).unwrap().last_vote.timestamp, 10);
        assert_eq!(reloaded.get(&key(2)).unwrap().last_vote.timestamp, 20);
    }

    #[test]
    fn inactive_finalizers_survive_a_narrowed_key_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fsi.dat");

        let (store, mut active) = FsiStore::open(&path, &[key(1), key(2)]).unwrap();
        active.insert(key(1), sample_fsi(10));
        active.insert(key(2), sample_fsi(20));
        store.save(&active).unwrap();

        // Re-open with only key(1) configured; key(2)'s record must survive.
        let (store2, active2) = FsiStore::open(&path, &[key(1)]).unwrap();
        assert_eq!(active2.len(), 1);
        store2.save(&active2).unwrap();

        let (_, full_reload) = FsiStore::open(&path, &[key(1), key(2)]).unwrap();
        assert_eq!(full_reload.get(&key(2)).unwrap().last_vote.timestamp, 20);
    }

    #[test]
    fn rejects_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fsi.dat");
        fs::write(&path, [0u8; 32]).unwrap();
        let err = FsiStore::open(&path, &[key(1)]).unwrap_err();
        assert!(matches!(err, FinalityError::BadMagic));
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fsi.dat");
        let (store, mut active) = FsiStore::open(&path, &[key(1)]).unwrap();
        active.insert(key(1), sample_fsi(5));
        store.save(&active).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let err = FsiStore::open(&path, &[key(1)]).unwrap_err();
        assert!(matches!(err, FinalityError::BadChecksum));
    }

    #[test]
    fn reads_legacy_v0_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fsi.dat");

        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC.to_le_bytes());
        buf.extend_from_slice(&VERSION_V0.to_le_bytes());
        buf.extend_from_slice(&1u64.to_le_bytes());
        buf.extend_from_slice(&key(7));
        encode_block_ref_v0(&sample_fsi(30).last_vote, &mut buf);
        encode_block_ref_v0(&sample_fsi(30).lock, &mut buf);
        buf.push(1); // votes_forked_since_latest_strong_vote = true
        fs::write(&path, &buf).unwrap();

        let (_, active) = FsiStore::open(&path, &[key(7)]).unwrap();
        let fsi = active.get(&key(7)).unwrap();
        assert_eq!(fsi.other_branch_latest_time, fsi.last_vote.timestamp);
    }
}
