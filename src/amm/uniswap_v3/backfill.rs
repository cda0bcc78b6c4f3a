//! Loads the tick bitmap and tick liquidity around a pool's current tick.
//!
//! Bitmap words are fetched in windows around the current word and scanned outward until
//! enough initialized ticks are found on each side. A window of words that adds no new ticks
//! ends the search, so liquidity further away than that is not loaded.

use std::collections::BTreeMap;

use alloy::{
    primitives::{aliases::I24, Address, Bytes, U256},
    rpc::types::BlockNumberOrTag,
    sol_types::SolCall,
};
use tracing::{debug, instrument};

use super::{word_and_bit, IUniswapV3Pool, TickInfo};
use crate::{
    amm::consts::{MAX_TICK, MIN_TICK},
    errors::{AMMError, ArithmeticError, StateError},
    rpc::{requests::CallRequest, RpcClient, Transport},
};

/// Number of words fetched below the current word in the first window, and the number added
/// to an exhausted side on each extension.
pub const WORD_WINDOW: i16 = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickData {
    /// Every fetched word, zero words included.
    pub bitmap: BTreeMap<i16, U256>,
    pub ticks: BTreeMap<i32, TickInfo>,
}

/// Which sides of a scan stopped on a word that has not been fetched yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanNeeds {
    pub lower: bool,
    pub upper: bool,
}

impl ScanNeeds {
    pub fn any(&self) -> bool {
        self.lower || self.upper
    }
}

/// Outward scan over compressed ticks.
///
/// The lower cursor starts at the current compressed tick and collects up to half the target,
/// the upper cursor starts one above it and collects the rest. Cursors resume where they
/// stopped when more words become available.
#[derive(Debug, Clone)]
pub struct TickScan {
    tick_spacing: i32,
    target: usize,
    min_compressed: i32,
    max_compressed: i32,
    lower: i32,
    upper: i32,
    lower_found: usize,
    found: Vec<i32>,
}

impl TickScan {
    pub fn new(tick: i32, tick_spacing: i32, target: usize) -> Result<Self, AMMError> {
        if tick_spacing <= 0 {
            return Err(StateError::TickNotOnSpacing { tick, tick_spacing }.into());
        }
        if !(MIN_TICK..=MAX_TICK).contains(&tick) {
            return Err(ArithmeticError::TickOutOfBounds(tick).into());
        }

        let compressed = tick.div_euclid(tick_spacing);

        Ok(TickScan {
            tick_spacing,
            target,
            min_compressed: MIN_TICK.div_euclid(tick_spacing),
            max_compressed: MAX_TICK.div_euclid(tick_spacing),
            lower: compressed,
            upper: compressed + 1,
            lower_found: 0,
            found: vec![],
        })
    }

    pub fn min_word(&self) -> i16 {
        word_and_bit(self.min_compressed).0
    }

    pub fn max_word(&self) -> i16 {
        word_and_bit(self.max_compressed).0
    }

    /// The first window of words, clamped to the words a tick can occupy.
    pub fn initial_words(&self) -> (i16, i16) {
        let (word_pos, _) = word_and_bit(self.lower);
        (
            word_pos.saturating_sub(WORD_WINDOW).max(self.min_word()),
            word_pos.saturating_add(WORD_WINDOW - 1).min(self.max_word()),
        )
    }

    /// Advances both cursors over the available `words`.
    pub fn scan(&mut self, words: &BTreeMap<i16, U256>) -> ScanNeeds {
        let mut needs = ScanNeeds::default();

        while self.lower_found < self.target / 2 && self.lower >= self.min_compressed {
            let (word_pos, bit_pos) = word_and_bit(self.lower);
            let Some(word) = words.get(&word_pos) else {
                needs.lower = true;
                break;
            };

            if word.bit(bit_pos as usize) {
                self.found.push(self.lower * self.tick_spacing);
                self.lower_found += 1;
            }
            self.lower -= 1;
        }

        while self.found.len() < self.target && self.upper <= self.max_compressed {
            let (word_pos, bit_pos) = word_and_bit(self.upper);
            let Some(word) = words.get(&word_pos) else {
                needs.upper = true;
                break;
            };

            if word.bit(bit_pos as usize) {
                self.found.push(self.upper * self.tick_spacing);
            }
            self.upper += 1;
        }

        needs
    }

    pub fn found(&self) -> &[i32] {
        &self.found
    }

    pub fn into_ticks(self) -> Vec<i32> {
        self.found
    }
}

/// Fetches bitmap words and liquidity data for about `number_of_ticks` initialized ticks
/// around `tick`, split evenly below and above it.
#[instrument(skip(client), level = "debug")]
pub async fn backfill_ticks<T: Transport>(
    client: &RpcClient<T>,
    pool: Address,
    tick: i32,
    tick_spacing: i32,
    number_of_ticks: usize,
    block: BlockNumberOrTag,
) -> Result<TickData, AMMError> {
    let mut scan = TickScan::new(tick, tick_spacing, number_of_ticks)?;

    let (mut low_word, mut high_word) = scan.initial_words();
    let mut bitmap = BTreeMap::new();
    bitmap.extend(fetch_bitmap_words(client, pool, (low_word..=high_word).collect(), block).await?);

    let mut previous_found = 0;
    loop {
        let needs = scan.scan(&bitmap);
        let found = scan.found().len();
        if !needs.any() || found == previous_found {
            break;
        }
        previous_found = found;

        let mut words = vec![];
        if needs.lower && low_word > scan.min_word() {
            let new_low = low_word.saturating_sub(WORD_WINDOW).max(scan.min_word());
            words.extend(new_low..low_word);
            low_word = new_low;
        }
        if needs.upper && high_word < scan.max_word() {
            let new_high = high_word.saturating_add(WORD_WINDOW).min(scan.max_word());
            words.extend(high_word + 1..=new_high);
            high_word = new_high;
        }

        if words.is_empty() {
            break;
        }
        bitmap.extend(fetch_bitmap_words(client, pool, words, block).await?);
    }

    let ticks = fetch_ticks(client, pool, scan.into_ticks(), block).await?;
    debug!(
        words = bitmap.len(),
        ticks = ticks.len(),
        "backfilled tick bitmap"
    );

    Ok(TickData { bitmap, ticks })
}

async fn fetch_bitmap_words<T: Transport>(
    client: &RpcClient<T>,
    pool: Address,
    words: Vec<i16>,
    block: BlockNumberOrTag,
) -> Result<Vec<(i16, U256)>, AMMError> {
    let requests = words
        .iter()
        .map(|word_pos| {
            let call = IUniswapV3Pool::tickBitmapCall {
                wordPosition: *word_pos,
            };
            CallRequest::new(pool, call.abi_encode(), block)
        })
        .collect::<Vec<_>>();

    let responses = client.send_batch(&requests).await?;

    words
        .into_iter()
        .zip(responses)
        .map(|(word_pos, response)| {
            let data = existing(pool, response?)?;
            let word = IUniswapV3Pool::tickBitmapCall::abi_decode_returns(&data, true)?._0;
            Ok((word_pos, word))
        })
        .collect()
}

async fn fetch_ticks<T: Transport>(
    client: &RpcClient<T>,
    pool: Address,
    ticks: Vec<i32>,
    block: BlockNumberOrTag,
) -> Result<BTreeMap<i32, TickInfo>, AMMError> {
    if ticks.is_empty() {
        return Ok(BTreeMap::new());
    }

    let requests = ticks
        .iter()
        .map(|tick| {
            let tick_i24 =
                I24::try_from(*tick).map_err(|_| ArithmeticError::TickOutOfBounds(*tick))?;
            let call = IUniswapV3Pool::ticksCall { tick: tick_i24 };
            Ok(CallRequest::new(pool, call.abi_encode(), block))
        })
        .collect::<Result<Vec<_>, AMMError>>()?;

    let responses = client.send_batch(&requests).await?;

    ticks
        .into_iter()
        .zip(responses)
        .map(|(tick, response)| {
            let data = existing(pool, response?)?;
            let info = IUniswapV3Pool::ticksCall::abi_decode_returns(&data, true)?;
            Ok((tick, TickInfo::new(info.liquidityNet, info.liquidityGross)))
        })
        .collect()
}

fn existing(pool: Address, data: Option<Bytes>) -> Result<Bytes, AMMError> {
    data.ok_or(AMMError::PoolDoesNotExist(pool))
}
