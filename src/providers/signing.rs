//! Transaction Selection
//!
//! Decides which transactions of a group an adapter signs and merges the
//! signatures back in original order. Every adapter goes through this
//! module so the selection rules stay identical across providers.

use std::collections::BTreeSet;

use super::{Account, ProviderError, TxnGroups, WalletTransaction};
use crate::txn::{decode_transaction, encode_base64, DecodedTransaction, Transaction};

/// One position of the flattened group
#[derive(Debug)]
struct Entry {
    original: Vec<u8>,
    decoded: Option<DecodedTransaction>,
    /// Set when this position will be signed
    signer: Option<Signer>,
}

#[derive(Debug, Clone)]
struct Signer {
    address: String,
    auth_addr: Option<String>,
}

/// A transaction selected for signing
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub index: usize,
    pub txn: &'a Transaction,
    /// Address of the sending account
    pub address: &'a str,
    /// Rekeyed authority, if any
    pub auth_addr: Option<&'a str>,
}

impl Candidate<'_> {
    /// Address whose key must produce the signature
    pub fn signer(&self) -> &str {
        self.auth_addr.unwrap_or(self.address)
    }
}

/// Signing selection for one request
#[derive(Debug)]
pub struct SigningPlan {
    entries: Vec<Entry>,
}

impl SigningPlan {
    /// Select candidates.
    ///
    /// With non-empty `indexes`, exactly those positions are signed and each
    /// must belong to a connected account. Otherwise every unsigned
    /// transaction sent by a connected account is signed.
    pub fn build(
        connected: &[Account],
        groups: &TxnGroups,
        indexes: Option<&[usize]>,
    ) -> Result<Self, ProviderError> {
        let flat = groups.flatten();
        let find = |sender: &str| connected.iter().find(|a| a.address == sender);

        let selected: Option<BTreeSet<usize>> = match indexes {
            Some(idx) if !idx.is_empty() => {
                if let Some(bad) = idx.iter().find(|i| **i >= flat.len()) {
                    return Err(ProviderError::MalformedInput(format!(
                        "Index {} out of range for {} transactions",
                        bad,
                        flat.len()
                    )));
                }
                Some(idx.iter().copied().collect())
            }
            _ => None,
        };

        let mut entries = Vec::with_capacity(flat.len());
        for (index, bytes) in flat.into_iter().enumerate() {
            let forced = selected.as_ref().map(|s| s.contains(&index));

            let (decoded, signer) = match forced {
                // explicitly indexed: must decode and must be ours
                Some(true) => {
                    let decoded = decode_transaction(bytes).map_err(|e| {
                        ProviderError::MalformedInput(format!("Transaction {}: {}", index, e))
                    })?;
                    let account = find(decoded.sender()).ok_or_else(|| {
                        ProviderError::MalformedInput(format!(
                            "Transaction {} sender {} is not a connected account",
                            index,
                            decoded.sender()
                        ))
                    })?;
                    let signer = Signer {
                        address: account.address.clone(),
                        auth_addr: account.auth_addr.clone(),
                    };
                    (Some(decoded), Some(signer))
                }
                Some(false) => (decode_transaction(bytes).ok(), None),
                None => {
                    let decoded = decode_transaction(bytes).map_err(|e| {
                        ProviderError::MalformedInput(format!("Transaction {}: {}", index, e))
                    })?;
                    let signer = match &decoded {
                        DecodedTransaction::Unsigned(txn) => find(&txn.sender).map(|account| Signer {
                            address: account.address.clone(),
                            auth_addr: account.auth_addr.clone(),
                        }),
                        DecodedTransaction::Signed(_) => None,
                    };
                    (Some(decoded), signer)
                }
            };

            entries.push(Entry {
                original: bytes.to_vec(),
                decoded,
                signer,
            });
        }

        Ok(Self { entries })
    }

    /// Total number of positions
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of positions that will be signed
    pub fn candidate_count(&self) -> usize {
        self.entries.iter().filter(|e| e.signer.is_some()).count()
    }

    /// Candidates in increasing position
    pub fn candidates(&self) -> impl Iterator<Item = Candidate<'_>> {
        self.entries.iter().enumerate().filter_map(|(index, entry)| {
            let signer = entry.signer.as_ref()?;
            let txn = entry.decoded.as_ref()?.txn();
            Some(Candidate {
                index,
                txn,
                address: &signer.address,
                auth_addr: signer.auth_addr.as_deref(),
            })
        })
    }

    /// Whole group in wallet request form, non-candidates marked to skip
    pub fn wallet_transactions(&self) -> Vec<WalletTransaction> {
        self.entries
            .iter()
            .map(|entry| {
                let txn = match &entry.decoded {
                    Some(decoded) => encode_base64(&decoded.txn().encode()),
                    None => encode_base64(&entry.original),
                };
                match &entry.signer {
                    Some(signer) => WalletTransaction::sign(txn, signer.auth_addr.clone()),
                    None => WalletTransaction::skip(txn),
                }
            })
            .collect()
    }

    /// Pick candidate signatures out of a full-length wallet response
    pub fn collect_positional(
        &self,
        results: Vec<Option<Vec<u8>>>,
    ) -> Result<Vec<Vec<u8>>, ProviderError> {
        if results.len() != self.entries.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "Expected {} results, got {}",
                self.entries.len(),
                results.len()
            )));
        }

        self.entries
            .iter()
            .zip(results)
            .enumerate()
            .filter(|(_, (entry, _))| entry.signer.is_some())
            .map(|(index, (_, result))| {
                result.ok_or_else(|| {
                    ProviderError::InvalidResponse(format!("Transaction {} was not signed", index))
                })
            })
            .collect()
    }

    /// Merge candidate signatures back into the group.
    ///
    /// `signed` holds one entry per candidate in increasing position. With
    /// `return_group` every other position is echoed unchanged.
    pub fn merge(
        self,
        signed: Vec<Vec<u8>>,
        return_group: bool,
    ) -> Result<Vec<Vec<u8>>, ProviderError> {
        let expected = self.candidate_count();
        if signed.len() != expected {
            return Err(ProviderError::InvalidResponse(format!(
                "Expected {} signed transactions, got {}",
                expected,
                signed.len()
            )));
        }

        let mut signed = signed.into_iter();
        let mut out = Vec::with_capacity(if return_group { self.entries.len() } else { expected });
        for entry in self.entries {
            if entry.signer.is_some() {
                if let Some(bytes) = signed.next() {
                    out.push(bytes);
                }
            } else if return_group {
                out.push(entry.original);
            }
        }
        Ok(out)
    }
}
