//! Log decoding for the scanners.
//!
//! Raw [`ChainLog`]s are decoded with the `sol!` bindings. Logs that do not
//! decode are skipped, never fatal: a node can return unrelated logs that
//! share a topic0 (ERC-721 `Transfer` has the same signature).

use alloy::{
    primitives::{Address, LogData, B256, U256},
    sol_types::SolEvent,
};

use crate::{
    abis::{PairCreated, TokenCreated, Transfer},
    db::models::TradeSide,
    rpc::ChainLog,
    worker::targets::TargetTokens,
};

/// A target-token transfer with a router on exactly one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterLeg {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub router: Address,
    pub counterparty: Address,
    pub amount: U256,
    pub side: TradeSide,
    pub block_number: u64,
    pub tx_hash: B256,
    pub log_index: u64,
}

fn log_data(log: &ChainLog) -> LogData {
    LogData::new_unchecked(log.topics.clone(), log.data.clone())
}

fn has_topic0(log: &ChainLog, signature: B256) -> bool {
    log.topics.first() == Some(&signature)
}

/// Decode an ERC-20 `Transfer`. Requires exactly three topics.
pub fn decode_transfer(log: &ChainLog) -> Option<Transfer> {
    if log.topics.len() != 3 || !has_topic0(log, Transfer::SIGNATURE_HASH) {
        return None;
    }
    Transfer::decode_log_data(&log_data(log)).ok()
}

pub fn decode_token_created(log: &ChainLog) -> Option<TokenCreated> {
    if !has_topic0(log, TokenCreated::SIGNATURE_HASH) {
        return None;
    }
    TokenCreated::decode_log_data(&log_data(log)).ok()
}

pub fn decode_pair_created(log: &ChainLog) -> Option<PairCreated> {
    if !has_topic0(log, PairCreated::SIGNATURE_HASH) {
        return None;
    }
    PairCreated::decode_log_data(&log_data(log)).ok()
}

/// Classify a transfer against the router set.
///
/// Router as sender means the user received tokens (BUY); router as
/// receiver means the user gave them up (SELL). Router-to-router and
/// non-router transfers are not trades.
pub fn classify(
    from: Address,
    to: Address,
    routers: &[Address],
) -> Option<(Address, Address, TradeSide)> {
    match (routers.contains(&from), routers.contains(&to)) {
        (true, false) => Some((from, to, TradeSide::Buy)),
        (false, true) => Some((to, from, TradeSide::Sell)),
        _ => None,
    }
}

/// Extract router legs of target tokens from a batch of logs, preserving
/// log order.
pub fn parse_router_legs(
    logs: &[ChainLog],
    targets: &TargetTokens,
    routers: &[Address],
) -> Vec<RouterLeg> {
    logs.iter()
        .filter(|log| targets.contains(&log.address))
        .filter_map(|log| {
            let event = decode_transfer(log)?;
            let (router, counterparty, side) = classify(event.from, event.to, routers)?;

            Some(RouterLeg {
                token: log.address,
                from: event.from,
                to: event.to,
                router,
                counterparty,
                amount: event.value,
                side,
                block_number: log.block_number,
                tx_hash: log.tx_hash,
                log_index: log.log_index,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{pair_created_log, transfer_log, tx_hash};
    use alloy::primitives::{address, Bytes};

    const ROUTER: Address = address!("0x6a000f20005980200259b80c5102003040001068");
    const OTHER_ROUTER: Address = address!("0xdef171fe48cf0115b1d80b88dc8eab59176fee57");
    const TOKEN: Address = address!("0x1000000000000000000000000000000000000001");
    const USER: Address = address!("0x2000000000000000000000000000000000000002");

    fn targets() -> TargetTokens {
        [(TOKEN, 18)].into_iter().collect()
    }

    #[test]
    fn test_router_sender_is_buy_and_receiver_is_sell() {
        let routers = [ROUTER, OTHER_ROUTER];
        assert_eq!(classify(ROUTER, USER, &routers), Some((ROUTER, USER, TradeSide::Buy)));
        assert_eq!(
            classify(USER, OTHER_ROUTER, &routers),
            Some((OTHER_ROUTER, USER, TradeSide::Sell))
        );
        assert_eq!(classify(ROUTER, OTHER_ROUTER, &routers), None);
        assert_eq!(classify(USER, TOKEN, &routers), None);
    }

    #[test]
    fn test_only_target_tokens_produce_legs() {
        let stranger = address!("0x3000000000000000000000000000000000000003");
        let logs = vec![
            transfer_log(TOKEN, ROUTER, USER, U256::from(5), 10, tx_hash(1), 0),
            transfer_log(stranger, ROUTER, USER, U256::from(5), 10, tx_hash(1), 1),
            transfer_log(TOKEN, USER, ROUTER, U256::from(7), 11, tx_hash(2), 4),
            transfer_log(TOKEN, USER, stranger, U256::from(9), 11, tx_hash(2), 5),
        ];

        let legs = parse_router_legs(&logs, &targets(), &[ROUTER]);

        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].side, TradeSide::Buy);
        assert_eq!(legs[0].counterparty, USER);
        assert_eq!(legs[0].amount, U256::from(5));
        assert_eq!(legs[1].side, TradeSide::Sell);
        assert_eq!(legs[1].log_index, 4);
        assert_eq!(legs[1].tx_hash, tx_hash(2));
    }

    #[test]
    fn test_malformed_transfers_are_ignored() {
        let mut nft_style = transfer_log(TOKEN, ROUTER, USER, U256::from(1), 10, tx_hash(1), 0);
        nft_style.topics.push(B256::with_last_byte(1));
        nft_style.data = Bytes::new();

        let mut truncated = transfer_log(TOKEN, ROUTER, USER, U256::from(1), 10, tx_hash(1), 1);
        truncated.data = Bytes::from(vec![0u8; 3]);

        assert!(decode_transfer(&nft_style).is_none());
        assert!(decode_transfer(&truncated).is_none());
        assert!(parse_router_legs(&[nft_style, truncated], &targets(), &[ROUTER]).is_empty());
    }

    #[test]
    fn test_decoders_check_topic0() {
        let wavax = address!("0xb31f66aa3c1e785363f0875a1b74e27b85fd66c7");
        let pair = address!("0x4000000000000000000000000000000000000004");
        let log = pair_created_log(TOKEN, wavax, pair, 20, tx_hash(3));

        let event = decode_pair_created(&log).unwrap();
        assert_eq!(event.pair, pair);
        assert!(decode_transfer(&log).is_none());
        assert!(decode_token_created(&log).is_none());
    }
}
