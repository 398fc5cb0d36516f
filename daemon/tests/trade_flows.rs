mod common;

use primitive_types::U256;

use common::{balance, fund, keypair, processor, signed_tx};
use nhb_common::{
    crypto::{keccak256, Hash},
    escrow::{EscrowStatus, Token, TradeOutcome, TradeStatus},
    events::Event,
    transaction::{EscrowPayload, TradeCreatePayload, TradePayload, TransactionPayload},
};
use nhb_daemon::core::{
    error::ChainError,
    state::{EscrowProvider, ProcessorConfig, TradeProvider},
};

const T0: u64 = 1_700_000_000;
const DEADLINE: i64 = (T0 + 7200) as i64;

fn trade_payload(seller: nhb_common::crypto::Address) -> TradePayload {
    TradePayload::Create(TradeCreatePayload {
        offer_id: keccak256(b"offer-1"),
        seller,
        base_token: Token::Nhb,
        base_amount: U256::from(150u64),
        quote_token: Token::Znhb,
        quote_amount: U256::from(100u64),
        deadline: DEADLINE,
        slippage_bps: 50,
        trade_nonce: keccak256(b"trade-nonce"),
    })
}

fn created_trade_id(events: &[Event]) -> Hash {
    events
        .iter()
        .find_map(|event| match event {
            Event::TradeCreated { id, .. } => Some(id.clone()),
            _ => None,
        })
        .expect("trade created event")
}

#[test]
fn atomic_settlement_swaps_both_legs() -> Result<(), Box<dyn std::error::Error>> {
    let buyer = keypair(1);
    let seller = keypair(2);

    let mut processor = processor(ProcessorConfig::default());
    fund(&mut processor, &seller.address(), Token::Nhb, 150)?;
    fund(&mut processor, &buyer.address(), Token::Znhb, 100)?;

    processor.begin_block(1, T0);
    let outcome = processor.execute(&signed_tx(
        &buyer,
        0,
        TransactionPayload::Trade(trade_payload(seller.address())),
    ))?;
    let trade_id = created_trade_id(&outcome.events);
    let trade = processor.state_mut().get_trade(&trade_id)?.unwrap();
    assert_eq!(trade.status, TradeStatus::Init);

    // seller funds the base leg, buyer funds the quote leg
    processor.execute(&signed_tx(
        &seller,
        0,
        TransactionPayload::Escrow(EscrowPayload::Lock {
            id: trade.escrow_base.clone(),
        }),
    ))?;
    let partial = processor.state_mut().get_trade(&trade_id)?.unwrap();
    assert_eq!(partial.status, TradeStatus::PartialFunded);

    processor.execute(&signed_tx(
        &buyer,
        1,
        TransactionPayload::Escrow(EscrowPayload::Lock {
            id: trade.escrow_quote.clone(),
        }),
    ))?;
    let funded = processor.state_mut().get_trade(&trade_id)?.unwrap();
    assert_eq!(funded.status, TradeStatus::Funded);

    processor.execute(&signed_tx(
        &buyer,
        2,
        TransactionPayload::Trade(TradePayload::Settle {
            id: trade_id.clone(),
        }),
    ))?;

    assert_eq!(
        balance(&mut processor, &buyer.address(), Token::Nhb)?,
        U256::from(150u64)
    );
    assert_eq!(
        balance(&mut processor, &seller.address(), Token::Znhb)?,
        U256::from(100u64)
    );
    assert_eq!(
        balance(&mut processor, &seller.address(), Token::Nhb)?,
        U256::zero()
    );
    assert_eq!(
        balance(&mut processor, &buyer.address(), Token::Znhb)?,
        U256::zero()
    );
    let settled = processor.state_mut().get_trade(&trade_id)?.unwrap();
    assert_eq!(settled.status, TradeStatus::Settled);

    // settling again is a no-op success
    processor.execute(&signed_tx(
        &buyer,
        3,
        TransactionPayload::Trade(TradePayload::Settle { id: trade_id }),
    ))?;
    assert_eq!(
        balance(&mut processor, &buyer.address(), Token::Nhb)?,
        U256::from(150u64)
    );
    Ok(())
}

#[test]
fn expiry_refunds_the_single_funded_leg() -> Result<(), Box<dyn std::error::Error>> {
    let buyer = keypair(1);
    let seller = keypair(2);

    let mut processor = processor(ProcessorConfig::default());
    fund(&mut processor, &seller.address(), Token::Nhb, 150)?;

    processor.begin_block(1, T0);
    let outcome = processor.execute(&signed_tx(
        &buyer,
        0,
        TransactionPayload::Trade(trade_payload(seller.address())),
    ))?;
    let trade_id = created_trade_id(&outcome.events);
    let trade = processor.state_mut().get_trade(&trade_id)?.unwrap();

    // only the base leg is funded
    processor.execute(&signed_tx(
        &seller,
        0,
        TransactionPayload::Escrow(EscrowPayload::Lock {
            id: trade.escrow_base.clone(),
        }),
    ))?;
    assert_eq!(
        balance(&mut processor, &seller.address(), Token::Nhb)?,
        U256::zero()
    );

    // at the deadline the funded leg is refunded and the trade expires
    processor.begin_block(2, DEADLINE as u64);
    processor.execute(&signed_tx(
        &buyer,
        1,
        TransactionPayload::Trade(TradePayload::Expire {
            id: trade_id.clone(),
        }),
    ))?;

    assert_eq!(
        balance(&mut processor, &seller.address(), Token::Nhb)?,
        U256::from(150u64)
    );
    let expired = processor.state_mut().get_trade(&trade_id)?.unwrap();
    assert_eq!(expired.status, TradeStatus::Expired);
    let base = processor.state_mut().get_escrow(&trade.escrow_base)?.unwrap();
    assert_eq!(base.status, EscrowStatus::Refunded);

    // a second expiry call is a no-op success
    processor.execute(&signed_tx(
        &buyer,
        2,
        TransactionPayload::Trade(TradePayload::Expire { id: trade_id }),
    ))?;
    assert_eq!(
        balance(&mut processor, &seller.address(), Token::Nhb)?,
        U256::from(150u64)
    );
    Ok(())
}

#[test]
fn unfunded_trade_cancels_at_deadline() -> Result<(), Box<dyn std::error::Error>> {
    let buyer = keypair(1);
    let seller = keypair(2);

    let mut processor = processor(ProcessorConfig::default());
    processor.begin_block(1, T0);
    let outcome = processor.execute(&signed_tx(
        &buyer,
        0,
        TransactionPayload::Trade(trade_payload(seller.address())),
    ))?;
    let trade_id = created_trade_id(&outcome.events);

    processor.begin_block(2, DEADLINE as u64);
    processor.execute(&signed_tx(
        &buyer,
        1,
        TransactionPayload::Trade(TradePayload::Expire {
            id: trade_id.clone(),
        }),
    ))?;
    let cancelled = processor.state_mut().get_trade(&trade_id)?.unwrap();
    assert_eq!(cancelled.status, TradeStatus::Cancelled);
    Ok(())
}

#[test]
fn fully_funded_trade_requires_resolution_at_deadline() -> Result<(), Box<dyn std::error::Error>> {
    let buyer = keypair(1);
    let seller = keypair(2);
    let arbitrator = keypair(9);

    let mut processor = processor(ProcessorConfig {
        trade_arbitrator: Some(arbitrator.address()),
        ..ProcessorConfig::default()
    });
    fund(&mut processor, &seller.address(), Token::Nhb, 150)?;
    fund(&mut processor, &buyer.address(), Token::Znhb, 100)?;

    processor.begin_block(1, T0);
    let outcome = processor.execute(&signed_tx(
        &buyer,
        0,
        TransactionPayload::Trade(trade_payload(seller.address())),
    ))?;
    let trade_id = created_trade_id(&outcome.events);
    let trade = processor.state_mut().get_trade(&trade_id)?.unwrap();

    processor.execute(&signed_tx(
        &seller,
        0,
        TransactionPayload::Escrow(EscrowPayload::Lock {
            id: trade.escrow_base.clone(),
        }),
    ))?;
    processor.execute(&signed_tx(
        &buyer,
        1,
        TransactionPayload::Escrow(EscrowPayload::Lock {
            id: trade.escrow_quote.clone(),
        }),
    ))?;

    // both legs funded: expiry insists on a resolution
    processor.begin_block(2, DEADLINE as u64);
    let result = processor.execute(&signed_tx(
        &buyer,
        2,
        TransactionPayload::Trade(TradePayload::Expire {
            id: trade_id.clone(),
        }),
    ));
    assert!(matches!(result, Err(ChainError::TradeRequiresResolution(_))));

    // the buyer disputes, the arbitrator refunds both legs
    processor.execute(&signed_tx(
        &buyer,
        2,
        TransactionPayload::Trade(TradePayload::Dispute {
            id: trade_id.clone(),
        }),
    ))?;
    processor.execute(&signed_tx(
        &arbitrator,
        0,
        TransactionPayload::Trade(TradePayload::Resolve {
            id: trade_id.clone(),
            outcome: TradeOutcome::RefundBoth,
        }),
    ))?;

    assert_eq!(
        balance(&mut processor, &seller.address(), Token::Nhb)?,
        U256::from(150u64)
    );
    assert_eq!(
        balance(&mut processor, &buyer.address(), Token::Znhb)?,
        U256::from(100u64)
    );
    let settled = processor.state_mut().get_trade(&trade_id)?.unwrap();
    assert_eq!(settled.status, TradeStatus::Settled);

    // only the configured arbitrator may resolve
    let result = processor.execute(&signed_tx(
        &buyer,
        3,
        TransactionPayload::Trade(TradePayload::Dispute { id: trade_id }),
    ));
    // trade is terminal now, disputing it again is invalid
    assert!(matches!(
        result,
        Err(ChainError::InvalidTradeTransition { .. })
    ));
    Ok(())
}
