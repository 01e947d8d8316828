//! Human-readable rendering of balances and channel states for observers.

use paychan_types::{Amount, Asset, ChannelParams, ChannelState, Network};
use serde_json::{json, Value};

/// Decimal places shown to users.
const DISPLAY_PRECISION: usize = 2;

/// Render an amount as `"<x.xx> <SYMBOL>"`.
pub fn render_balance(amount: Amount, asset: &Asset) -> String {
    format!(
        "{} {}",
        asset.format_amount(amount, DISPLAY_PRECISION),
        asset.symbol
    )
}

fn party_lines(params: &ChannelParams, state: &ChannelState, network: Network) -> Vec<(String, String)> {
    let asset = &state.allocation.asset;
    state
        .allocation
        .balances
        .iter()
        .enumerate()
        .map(|(idx, balance)| {
            let address = params
                .participants
                .get(idx)
                .map(|p| network.display_address(&p.chain))
                .unwrap_or_else(|| format!("participant {}", idx));
            (address, render_balance(*balance, asset))
        })
        .collect()
}

/// Multi-line view of a channel state as shown to observers.
pub fn render_state(params: &ChannelParams, state: &ChannelState, network: Network) -> String {
    let mut out = format!("Channel ID: {}\nVersion: {}\n", state.id, state.version);
    for (address, balance) in party_lines(params, state, network) {
        out.push_str(&format!("{}: {}\n", address, balance));
    }
    out.push_str(&format!("Final: {}", state.is_final));
    out
}

/// Structured variant of [`render_state`] for machine consumers.
pub fn render_state_json(params: &ChannelParams, state: &ChannelState, network: Network) -> Value {
    let parties: Vec<Value> = party_lines(params, state, network)
        .into_iter()
        .map(|(address, balance)| json!({ "address": address, "balance": balance }))
        .collect();

    json!({
        "channel_id": state.id.to_string(),
        "version": state.version,
        "participants": parties,
        "is_final": state.is_final,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use paychan_types::{Allocation, ChainAddress, ChannelId, Participant, WireAddress};

    fn fixture() -> (ChannelParams, ChannelState) {
        let id = ChannelId::new_random();
        let params = ChannelParams {
            id,
            participants: ["alice", "bob"]
                .iter()
                .map(|name| Participant {
                    wire: WireAddress::from(*name),
                    chain: ChainAddress::from_seed(name),
                })
                .collect(),
            challenge_duration_secs: 10,
        };
        let asset = Asset::ckb();
        let state = ChannelState::initial(
            id,
            Allocation::two_party(
                asset.clone(),
                asset.parse_amount("70").unwrap(),
                asset.parse_amount("130.456").unwrap(),
            ),
        );
        (params, state)
    }

    #[test]
    fn test_render_balance() {
        let ckb = Asset::ckb();
        assert_eq!(render_balance(Amount::ZERO, &ckb), "0.00 CKB");
        assert_eq!(render_balance(Amount(150_000_000), &ckb), "1.50 CKB");
        assert_eq!(render_balance(Amount(1_999_999_999), &ckb), "19.99 CKB");
    }

    #[test]
    fn test_render_state_lists_both_parties() {
        let (params, state) = fixture();
        let rendered = render_state(&params, &state, Network::Testnet);

        assert!(rendered.starts_with(&format!("Channel ID: {}\nVersion: 0\n", state.id)));
        assert!(rendered.contains("70.00 CKB"));
        assert!(rendered.contains("130.45 CKB"));
        assert!(rendered.contains("ckt1"));
        assert!(rendered.ends_with("Final: false"));
    }

    #[test]
    fn test_render_state_json() {
        let (params, state) = fixture();
        let value = render_state_json(&params, &state, Network::Devnet);

        assert_eq!(value["version"], 0);
        assert_eq!(value["is_final"], false);
        assert_eq!(value["participants"][1]["balance"], "130.45 CKB");
    }
}
