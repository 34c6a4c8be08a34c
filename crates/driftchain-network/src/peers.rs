//! Peer discovery: the address book built from static config and
//! `PEER_LIST` replies, and the rule for which witnesses to dial.

use std::collections::{HashMap, HashSet};

use driftchain_types::witness::WitnessInfo;
use driftchain_types::AccountName;

use crate::wire::PeerAddress;

/// The known reachable addresses for accounts, merged from static config
/// and gossiped `PEER_LIST` replies. Keyed by account name; a later entry
/// for the same account overwrites an earlier one.
#[derive(Default)]
pub struct AddressBook {
    addresses: HashMap<AccountName, String>,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the book from the node's static `peers` config, formatted
    /// `account@ws://host:port`.
    pub fn from_static_config(entries: &[String]) -> Self {
        let mut book = Self::new();
        for entry in entries {
            if let Some((account, ws)) = entry.split_once('@') {
                book.addresses.insert(account.to_string(), ws.to_string());
            }
        }
        book
    }

    /// Merges in addresses learned from a `PEER_LIST` reply.
    pub fn merge_peer_list(&mut self, peers: &[PeerAddress]) {
        for peer in peers {
            self.addresses.insert(peer.account.clone(), peer.ws_address.clone());
        }
    }

    pub fn address_of(&self, account: &str) -> Option<&str> {
        self.addresses.get(account).map(|s| s.as_str())
    }

    pub fn known_accounts(&self) -> Vec<AccountName> {
        self.addresses.keys().cloned().collect()
    }

    /// Snapshots the current book as a `PEER_LIST` payload.
    pub fn to_peer_list(&self) -> Vec<PeerAddress> {
        self.addresses
            .iter()
            .map(|(account, ws_address)| PeerAddress {
                account: account.clone(),
                ws_address: ws_address.clone(),
            })
            .collect()
    }
}

/// Selects the outgoing-connection targets per spec §4.11: the top `3 *
/// witnesses_count` ranked witnesses (by vote weight, ties by account name
/// ascending) that have a reachable address and are not already connected
/// or in-flight.
pub fn select_dial_targets(
    ranked_witnesses: &[WitnessInfo],
    witnesses_count: usize,
    book: &AddressBook,
    already_connected_or_dialing: &HashSet<AccountName>,
) -> Vec<(AccountName, String)> {
    let mut sorted: Vec<&WitnessInfo> = ranked_witnesses.iter().collect();
    sorted.sort_by(|a, b| b.vote_weight.cmp(&a.vote_weight).then_with(|| a.account.cmp(&b.account)));

    let cap = witnesses_count.saturating_mul(3);
    let mut targets = Vec::new();
    for witness in sorted.into_iter().take(cap) {
        if already_connected_or_dialing.contains(&witness.account) {
            continue;
        }
        if let Some(addr) = book.address_of(&witness.account) {
            targets.push((witness.account.clone(), addr.to_string()));
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftchain_numeric::Amount;

    fn witness(name: &str, weight: u64) -> WitnessInfo {
        WitnessInfo {
            account: name.to_string(),
            network_address: format!("ws://{name}"),
            vote_weight: Amount::from(weight),
            registered_at: 0,
        }
    }

    #[test]
    fn static_config_parses_account_at_address() {
        let book = AddressBook::from_static_config(&["w1@ws://host:9001".to_string()]);
        assert_eq!(book.address_of("w1"), Some("ws://host:9001"));
    }

    #[test]
    fn peer_list_merge_overwrites_existing_entries() {
        let mut book = AddressBook::from_static_config(&["w1@ws://old".to_string()]);
        book.merge_peer_list(&[PeerAddress {
            account: "w1".to_string(),
            ws_address: "ws://new".to_string(),
        }]);
        assert_eq!(book.address_of("w1"), Some("ws://new"));
    }

    #[test]
    fn dial_targets_skip_unreachable_and_already_connected_witnesses() {
        let witnesses = vec![witness("w1", 300), witness("w2", 200), witness("w3", 100)];
        let book = AddressBook::from_static_config(&["w1@ws://w1".to_string(), "w3@ws://w3".to_string()]);
        let mut connected = HashSet::new();
        connected.insert("w1".to_string());

        let targets = select_dial_targets(&witnesses, 1, &book, &connected);
        assert_eq!(targets, vec![("w3".to_string(), "ws://w3".to_string())]);
    }

    #[test]
    fn dial_targets_are_capped_at_three_times_witness_count() {
        let witnesses: Vec<WitnessInfo> = (0..10).map(|i| witness(&format!("w{i}"), 100 - i)).collect();
        let entries: Vec<String> = (0..10).map(|i| format!("w{i}@ws://w{i}")).collect();
        let book = AddressBook::from_static_config(&entries);
        let targets = select_dial_targets(&witnesses, 2, &book, &HashSet::new());
        assert_eq!(targets.len(), 6);
    }
}
