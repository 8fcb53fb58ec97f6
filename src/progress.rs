//! Coins, the upgrade track and HUD readouts.
//!
//! ## Flow
//!
//! 1. `MarkerPlaced` → [`award_coins_system`] adds
//!    `floor(distance × coins_per_unit)` coins and saves.
//! 2. [`UpgradeRequest`] → [`upgrade_purchase_system`] spends coins on the
//!    next click of the [`UpgradeTrack`] and reports an [`UpgradeResult`].
//! 3. Newly unlocked parts take effect on the next spawn or [`ResetRun`].
//!
//! Storage goes through the [`CoinStore`] trait, held in the [`CoinBank`]
//! resource.  [`TomlCoinStore`] writes `saves/progress.toml`;
//! [`MemoryCoinStore`] keeps everything in memory for tests.
//!
//! [`ResetRun`]: crate::plane::ResetRun

use std::fs;
use std::path::PathBuf;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::FlightConfig;
use crate::error::{FlightError, FlightResult};
use crate::plane::{MarkerPlaced, PartKind};

const PROGRESS_VERSION: u32 = 1;

/// Metres per second → kilometres per hour.
const MS_TO_KMH: f32 = 3.6;

/// Parts in the order the upgrade track unlocks them.
pub const UPGRADE_ORDER: [PartKind; 4] = [
    PartKind::LeftWing,
    PartKind::RightWing,
    PartKind::Tail,
    PartKind::Booster,
];

// ── Upgrade track ─────────────────────────────────────────────────────────────

/// Result of one paid click on the upgrade track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// Paid; the current part needs more clicks.
    Progress { clicks: u32, of: u32 },
    /// Paid; this click completed the part.
    Unlocked(PartKind),
    /// Not enough coins; nothing changed.
    Insufficient { cost: u64, balance: u64 },
    /// Everything is unlocked.
    Maxed,
}

/// How far the player has paid into the upgrade track.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeTrack {
    /// Paid clicks across all parts.
    pub clicks: u32,
    /// Price of the next click.  The balance must cover the full fractional
    /// price; only the whole part is deducted.
    pub current_cost: f32,
}

impl Default for UpgradeTrack {
    fn default() -> Self {
        Self::new(&FlightConfig::default())
    }
}

impl UpgradeTrack {
    pub fn new(config: &FlightConfig) -> Self {
        Self {
            clicks: 0,
            current_cost: config.upgrade_initial_cost,
        }
    }

    pub fn unlocked_count(&self, config: &FlightConfig) -> usize {
        let per_part = config.upgrade_clicks_per_part.max(1);
        ((self.clicks / per_part) as usize).min(UPGRADE_ORDER.len())
    }

    /// Parts outside the track (the fuselage) are always unlocked.
    pub fn is_unlocked(&self, kind: PartKind, config: &FlightConfig) -> bool {
        match UPGRADE_ORDER.iter().position(|k| *k == kind) {
            Some(index) => index < self.unlocked_count(config),
            None => true,
        }
    }

    pub fn is_maxed(&self, config: &FlightConfig) -> bool {
        self.unlocked_count(config) >= UPGRADE_ORDER.len()
    }

    /// Coins the next click deducts.
    pub fn next_cost(&self) -> u64 {
        self.current_cost.max(0.0).trunc() as u64
    }

    /// Whether `balance` covers the next click's fractional price.
    pub fn affordable(&self, balance: u64) -> bool {
        balance as f32 >= self.current_cost
    }

    /// Spend coins on one click.
    pub fn purchase_click(&mut self, store: &mut dyn CoinStore, config: &FlightConfig) -> PurchaseOutcome {
        if self.is_maxed(config) {
            return PurchaseOutcome::Maxed;
        }
        let cost = self.next_cost();
        if !self.affordable(store.get()) || !store.spend(cost) {
            return PurchaseOutcome::Insufficient {
                cost,
                balance: store.get(),
            };
        }

        let before = self.unlocked_count(config);
        self.clicks += 1;
        self.current_cost *= config.upgrade_cost_growth;

        if self.unlocked_count(config) > before {
            PurchaseOutcome::Unlocked(UPGRADE_ORDER[before])
        } else {
            let per_part = config.upgrade_clicks_per_part.max(1);
            PurchaseOutcome::Progress {
                clicks: self.clicks % per_part,
                of: per_part,
            }
        }
    }
}

// ── Coin store ────────────────────────────────────────────────────────────────

/// Where coins (and the upgrade track that was paid with them) are kept.
pub trait CoinStore: Send + Sync {
    /// Read the persisted balance, replacing the in-memory one.
    fn load(&mut self) -> FlightResult<u64>;
    /// Persist `coins` as the balance.
    fn save(&mut self, coins: u64) -> FlightResult<()>;
    fn get(&self) -> u64;
    /// Add to the in-memory balance and return the new total.
    fn add(&mut self, amount: u64) -> u64;
    /// Deduct `amount` if the balance covers it.
    fn spend(&mut self, amount: u64) -> bool;
    fn upgrade(&self) -> Option<UpgradeTrack>;
    fn set_upgrade(&mut self, track: UpgradeTrack);
}

/// Injected coin store.
#[derive(Resource)]
pub struct CoinBank(pub Box<dyn CoinStore>);

impl CoinBank {
    pub fn new(store: impl CoinStore + 'static) -> Self {
        Self(Box::new(store))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
struct ProgressSnapshot {
    version: u32,
    coins: u64,
    upgrade: Option<UpgradeTrack>,
}

/// TOML file store, `saves/progress.toml` by default.
#[derive(Debug, Clone)]
pub struct TomlCoinStore {
    path: PathBuf,
    coins: u64,
    upgrade: Option<UpgradeTrack>,
}

impl Default for TomlCoinStore {
    fn default() -> Self {
        Self::new(PathBuf::from("saves").join("progress.toml"))
    }
}

impl TomlCoinStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            coins: 0,
            upgrade: None,
        }
    }

    fn io_error(&self, source: std::io::Error) -> FlightError {
        FlightError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl CoinStore for TomlCoinStore {
    fn load(&mut self) -> FlightResult<u64> {
        if !self.path.exists() {
            self.coins = 0;
            self.upgrade = None;
            return Ok(0);
        }
        let contents = fs::read_to_string(&self.path).map_err(|err| self.io_error(err))?;
        let snapshot: ProgressSnapshot =
            toml::from_str(&contents).map_err(|source| FlightError::Parse {
                path: self.path.display().to_string(),
                source,
            })?;
        if snapshot.version != PROGRESS_VERSION {
            warn!(
                "[progress] {} has version {} (expected {}); reading anyway",
                self.path.display(),
                snapshot.version,
                PROGRESS_VERSION
            );
        }
        self.coins = snapshot.coins;
        self.upgrade = snapshot.upgrade;
        Ok(self.coins)
    }

    fn save(&mut self, coins: u64) -> FlightResult<()> {
        self.coins = coins;
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(|err| self.io_error(err))?;
            }
        }
        let snapshot = ProgressSnapshot {
            version: PROGRESS_VERSION,
            coins,
            upgrade: self.upgrade.clone(),
        };
        let serialized = toml::to_string_pretty(&snapshot)?;
        fs::write(&self.path, serialized).map_err(|err| self.io_error(err))
    }

    fn get(&self) -> u64 {
        self.coins
    }

    fn add(&mut self, amount: u64) -> u64 {
        self.coins = self.coins.saturating_add(amount);
        self.coins
    }

    fn spend(&mut self, amount: u64) -> bool {
        match self.coins.checked_sub(amount) {
            Some(rest) => {
                self.coins = rest;
                true
            }
            None => false,
        }
    }

    fn upgrade(&self) -> Option<UpgradeTrack> {
        self.upgrade.clone()
    }

    fn set_upgrade(&mut self, track: UpgradeTrack) {
        self.upgrade = Some(track);
    }
}

/// In-memory store; `save` only records how often it was called.
#[derive(Debug, Clone, Default)]
pub struct MemoryCoinStore {
    pub coins: u64,
    pub saved: Option<u64>,
    pub saves: u32,
    pub upgrade: Option<UpgradeTrack>,
}

impl MemoryCoinStore {
    pub fn with_coins(coins: u64) -> Self {
        Self {
            coins,
            ..Default::default()
        }
    }
}

impl CoinStore for MemoryCoinStore {
    fn load(&mut self) -> FlightResult<u64> {
        if let Some(saved) = self.saved {
            self.coins = saved;
        }
        Ok(self.coins)
    }

    fn save(&mut self, coins: u64) -> FlightResult<()> {
        self.coins = coins;
        self.saved = Some(coins);
        self.saves += 1;
        Ok(())
    }

    fn get(&self) -> u64 {
        self.coins
    }

    fn add(&mut self, amount: u64) -> u64 {
        self.coins = self.coins.saturating_add(amount);
        self.coins
    }

    fn spend(&mut self, amount: u64) -> bool {
        if amount > self.coins {
            return false;
        }
        self.coins -= amount;
        true
    }

    fn upgrade(&self) -> Option<UpgradeTrack> {
        self.upgrade.clone()
    }

    fn set_upgrade(&mut self, track: UpgradeTrack) {
        self.upgrade = Some(track);
    }
}

// ── HUD readouts ──────────────────────────────────────────────────────────────

/// Forward speed in km/h; flying backwards reads zero.
pub fn speedometer_kmh(velocity: Vec3, forward: Vec3) -> f32 {
    velocity.dot(forward.normalize_or_zero()).max(0.0) * MS_TO_KMH
}

/// How far `z` is between the start and end of the course, clamped to `[0, 1]`.
pub fn progress_fraction(z: f32, start_z: f32, end_z: f32) -> f32 {
    let span = end_z - start_z;
    if span.abs() <= f32::EPSILON {
        return 0.0;
    }
    ((z - start_z) / span).clamp(0.0, 1.0)
}

/// Coins earned for a run that reached `distance`.
pub fn coins_for_distance(distance: f32, config: &FlightConfig) -> u64 {
    (distance * config.coins_per_unit).max(0.0).floor() as u64
}

// ── Messages ──────────────────────────────────────────────────────────────────

/// Buy one click on the upgrade track.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpgradeRequest;

#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeResult(pub PurchaseOutcome);

/// Coins were added after a landing.
#[derive(Message, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoinsAwarded {
    pub amount: u64,
    pub total: u64,
}

// ── Systems ───────────────────────────────────────────────────────────────────

/// Read the saved balance and upgrade track.
pub fn load_progress_system(
    mut bank: ResMut<CoinBank>,
    config: Res<FlightConfig>,
    mut track: ResMut<UpgradeTrack>,
) {
    match bank.0.load() {
        Ok(coins) => info!("[progress] Loaded {coins} coins"),
        Err(err) => warn!("[progress] Could not load progress: {err}"),
    }
    *track = bank.0.upgrade().unwrap_or_else(|| UpgradeTrack::new(&config));
    info!(
        "[progress] Upgrade track: {} clicks, {} parts unlocked",
        track.clicks,
        track.unlocked_count(&config)
    );
}

/// Award coins for each landing marker.
pub fn award_coins_system(
    mut placed: MessageReader<MarkerPlaced>,
    config: Res<FlightConfig>,
    mut bank: ResMut<CoinBank>,
    mut awarded: MessageWriter<CoinsAwarded>,
) {
    for marker in placed.read() {
        let amount = coins_for_distance(marker.distance, &config);
        let total = bank.0.add(amount);
        if let Err(err) = bank.0.save(total) {
            warn!("[progress] Could not save coins: {err}");
        }
        info!("[progress] +{amount} coins ({total} total)");
        awarded.write(CoinsAwarded { amount, total });
    }
}

/// Handle upgrade clicks.
pub fn upgrade_purchase_system(
    mut requests: MessageReader<UpgradeRequest>,
    config: Res<FlightConfig>,
    mut bank: ResMut<CoinBank>,
    mut track: ResMut<UpgradeTrack>,
    mut results: MessageWriter<UpgradeResult>,
) {
    for _ in requests.read() {
        let outcome = track.purchase_click(bank.0.as_mut(), &config);
        match outcome {
            PurchaseOutcome::Progress { .. } | PurchaseOutcome::Unlocked(_) => {
                bank.0.set_upgrade(track.clone());
                let coins = bank.0.get();
                if let Err(err) = bank.0.save(coins) {
                    warn!("[progress] Could not save upgrade: {err}");
                }
                info!("[progress] Upgrade click: {outcome:?}");
            }
            PurchaseOutcome::Insufficient { .. } | PurchaseOutcome::Maxed => {
                debug!("[progress] Upgrade refused: {outcome:?}");
            }
        }
        results.write(UpgradeResult(outcome));
    }
}

// ── Plugin ────────────────────────────────────────────────────────────────────

/// Coins and upgrades.  Uses the [`CoinBank`] already inserted, or a
/// [`TomlCoinStore`] at the default path.
pub struct ProgressPlugin;

impl Plugin for ProgressPlugin {
    fn build(&self, app: &mut App) {
        if !app.world().contains_resource::<CoinBank>() {
            app.insert_resource(CoinBank::new(TomlCoinStore::default()));
        }
        app.init_resource::<UpgradeTrack>()
            .add_message::<UpgradeRequest>()
            .add_message::<UpgradeResult>()
            .add_message::<CoinsAwarded>()
            .add_systems(Startup, load_progress_system.after(crate::config::load_flight_config))
            .add_systems(Update, (award_coins_system, upgrade_purchase_system));
    }
}
