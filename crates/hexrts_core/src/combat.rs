//! Combat resolution: engagements, damage math, and casualties.
//!
//! An engagement pairs one attacking army against a defending army, a
//! building (with any same-owner army on its footprint fighting
//! alongside), or a villager group. Both sides take simultaneous
//! damage each resolution tick. Casualties are capped per exchange so
//! battles play out over multiple ticks instead of resolving
//! instantly.
//!
//! All fractional math is fixed-point and every engagement is resolved
//! in id order, so two simulations fed the same commands agree on
//! every casualty.

use serde::{Deserialize, Serialize};

use crate::army::ArmyId;
use crate::building::BuildingId;
use crate::commander::{CommanderId, XP_DEFEAT, XP_VICTORY};
use crate::events::{ChangeBuilder, StateChange};
use crate::hex::HexCoord;
use crate::math::{percent, Fixed};
use crate::player::PlayerId;
use crate::registry::{define_id, Registry};
use crate::state::GameState;
use crate::units::{
    dominant_category, roster_armor, roster_attack, roster_bonus, roster_size, roster_strength,
    TargetCategory, UnitRoster,
};
use crate::villager::VillagerGroupId;

define_id!(
    /// Unique identifier for engagements.
    EngagementId
);

/// Defense bonus granted by full entrenchment.
#[must_use]
pub fn entrench_bonus() -> Fixed {
    percent(25)
}

/// Nominal hit points per villager, used to size casualty fractions.
const VILLAGER_STRENGTH: u32 = 10;

/// What an attack order is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttackTarget {
    /// An enemy army.
    Army {
        /// Target army.
        army: ArmyId,
    },
    /// An enemy building.
    Building {
        /// Target building.
        building: BuildingId,
    },
    /// An enemy villager group.
    Villagers {
        /// Target group.
        group: VillagerGroupId,
    },
}

/// Engagement lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngagementPhase {
    /// Sides are locked; exchanges occur each resolution tick.
    Engaged,
    /// An exchange is in flight this tick.
    Resolving,
    /// Over; swept from the registry at end of tick.
    Ended,
}

/// A live fight between an attacker and one defender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Engagement {
    /// Unique id, assigned on registration.
    pub id: EngagementId,
    /// Attacking army.
    pub attacker: ArmyId,
    /// Owner of the attacking army.
    pub attacker_owner: PlayerId,
    /// What is being attacked.
    pub target: AttackTarget,
    /// Lifecycle phase.
    pub phase: EngagementPhase,
    /// Tick the engagement began.
    pub started: u64,
}

/// Tunable combat parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatConfig {
    /// Upper bound on the fraction of a side removed by one exchange.
    #[serde(with = "crate::math::fixed_serde")]
    pub max_casualty_fraction: Fixed,
    /// Units removed from a damaged side when rounding would spare
    /// everyone. Zero keeps the cap strict; exchanges in which both
    /// sides round to zero end the engagement as a stalemate.
    pub casualty_floor: u32,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            max_casualty_fraction: percent(30),
            casualty_floor: 0,
        }
    }
}

/// Resolves all live engagements against the game state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatResolver {
    config: CombatConfig,
    engagements: Registry<EngagementId, Engagement>,
}

impl Default for CombatResolver {
    fn default() -> Self {
        Self::new(CombatConfig::default())
    }
}

impl CombatResolver {
    /// Create a resolver with the given configuration.
    #[must_use]
    pub fn new(config: CombatConfig) -> Self {
        Self {
            config,
            engagements: Registry::new(),
        }
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &CombatConfig {
        &self.config
    }

    /// Look up an engagement.
    #[must_use]
    pub fn engagement(&self, id: EngagementId) -> Option<&Engagement> {
        self.engagements.get(id)
    }

    /// Live engagement ids in ascending order.
    #[must_use]
    pub fn engagement_ids(&self) -> Vec<EngagementId> {
        self.engagements.sorted_ids()
    }

    /// Open an engagement and lock the attacker into it.
    pub fn start(
        &mut self,
        state: &mut GameState,
        attacker: ArmyId,
        attacker_owner: PlayerId,
        target: AttackTarget,
        changes: &mut ChangeBuilder,
    ) -> EngagementId {
        let id = self.engagements.insert(Engagement {
            id: EngagementId(0),
            attacker,
            attacker_owner,
            target,
            phase: EngagementPhase::Engaged,
            started: state.tick(),
        });
        if let Some(e) = self.engagements.get_mut(id) {
            e.id = id;
        }
        if let Some(army) = state.army_mut(attacker) {
            army.engagement = Some(id);
            army.attack_order = None;
        }
        if let AttackTarget::Army { army } = target {
            if let Some(defender) = state.army_mut(army) {
                if defender.engagement.is_none() {
                    defender.engagement = Some(id);
                }
            }
        }
        changes.record(StateChange::EngagementStarted {
            engagement: id,
            attacker,
            target,
        });
        id
    }

    /// Break off an engagement without a victor (retreat, disengage).
    pub fn abort(&mut self, state: &mut GameState, id: EngagementId, changes: &mut ChangeBuilder) {
        let Some(engagement) = self.engagements.get_mut(id) else {
            return;
        };
        engagement.phase = EngagementPhase::Ended;
        let attacker = engagement.attacker;
        let target = engagement.target;
        release_army(state, attacker, id);
        if let AttackTarget::Army { army } = target {
            release_army(state, army, id);
        }
        changes.record(StateChange::EngagementEnded {
            engagement: id,
            victor: None,
        });
    }

    /// Resolve one exchange for every live engagement, in id order.
    pub fn resolve_tick(&mut self, state: &mut GameState, changes: &mut ChangeBuilder) {
        for id in self.engagements.sorted_ids() {
            let live = self
                .engagements
                .get(id)
                .is_some_and(|e| e.phase != EngagementPhase::Ended);
            if live {
                if let Some(e) = self.engagements.get_mut(id) {
                    e.phase = EngagementPhase::Resolving;
                }
                self.resolve_one(state, id, changes);
            }
        }
        // Sweep finished engagements
        for id in self.engagements.sorted_ids() {
            if self
                .engagements
                .get(id)
                .is_some_and(|e| e.phase == EngagementPhase::Ended)
            {
                self.engagements.remove(id);
            }
        }
    }

    fn resolve_one(&mut self, state: &mut GameState, id: EngagementId, changes: &mut ChangeBuilder) {
        let Some(engagement) = self.engagements.get(id) else {
            return;
        };
        let attacker_id = engagement.attacker;
        let attacker_owner = engagement.attacker_owner;
        let target = engagement.target;

        let Some(attack_side) = army_side(state, attacker_id) else {
            // Attacker destroyed elsewhere; nothing left to resolve.
            self.finish(state, id, None, changes);
            return;
        };

        match target {
            AttackTarget::Army { army } => {
                let Some(defend_side) = army_side(state, army) else {
                    self.finish(state, id, Some(attacker_owner), changes);
                    return;
                };
                self.exchange_armies(state, id, attack_side, defend_side, changes);
            }
            AttackTarget::Building { building } => {
                if state.building(building).is_none() {
                    self.finish(state, id, Some(attacker_owner), changes);
                    return;
                }
                self.exchange_building(state, id, attack_side, building, changes);
            }
            AttackTarget::Villagers { group } => {
                if state.villagers(group).is_none() {
                    self.finish(state, id, Some(attacker_owner), changes);
                    return;
                }
                self.exchange_villagers(state, id, attack_side, group, changes);
            }
        }
    }

    fn exchange_armies(
        &mut self,
        state: &mut GameState,
        id: EngagementId,
        attacker: SideSnapshot,
        defender: SideSnapshot,
        changes: &mut ChangeBuilder,
    ) {
        let incoming_to_defender = side_damage(state, &attacker, &defender.roster, defender.coord);
        let incoming_to_attacker = side_damage(state, &defender, &attacker.roster, attacker.coord);

        let defender_mitigation = defense_mitigation(state, defender.army);
        let attacker_mitigation = defense_mitigation(state, attacker.army);

        let defender_losses = self.apply_army_casualties(
            state,
            defender.army,
            scale_down(incoming_to_defender, defender_mitigation),
            changes,
        );
        let attacker_losses = self.apply_army_casualties(
            state,
            attacker.army,
            scale_down(incoming_to_attacker, attacker_mitigation),
            changes,
        );

        changes.record(StateChange::EngagementResolved {
            engagement: id,
            attacker_casualties: attacker_losses,
            defender_casualties: defender_losses,
        });

        let attacker_wiped = state.army(attacker.army).map_or(true, |a| a.size() == 0);
        let defender_wiped = state.army(defender.army).map_or(true, |a| a.size() == 0);

        if attacker_wiped {
            remove_wiped_army(state, attacker.army, changes);
        }
        if defender_wiped {
            remove_wiped_army(state, defender.army, changes);
        }
        let victor = match (attacker_wiped, defender_wiped) {
            (false, true) => Some(attacker.owner),
            (true, false) => Some(defender.owner),
            (true, true) => None,
            (false, false) => {
                if attacker_losses == 0 && defender_losses == 0 {
                    // Neither side can scratch the other; break off.
                    self.finish_between(
                        state,
                        id,
                        None,
                        attacker.commander,
                        defender.commander,
                        changes,
                    );
                } else if let Some(e) = self.engagements.get_mut(id) {
                    e.phase = EngagementPhase::Engaged;
                }
                return;
            }
        };
        self.finish_between(state, id, victor, attacker.commander, defender.commander, changes);
    }

    fn exchange_building(
        &mut self,
        state: &mut GameState,
        id: EngagementId,
        attacker: SideSnapshot,
        building_id: BuildingId,
        changes: &mut ChangeBuilder,
    ) {
        let Some(building) = state.building(building_id) else {
            return;
        };
        let building_owner = building.owner;
        let building_armor = building.kind.defense_armor();
        let building_attack = building.kind.defense_attack();
        let building_health = building.health;
        let footprint = building.footprint.clone();
        let terrain_bonus = state
            .map()
            .tile(building.anchor)
            .map_or(Fixed::ZERO, |t| t.terrain.defender_bonus());

        // A same-owner army standing on the footprint fights alongside
        // the building.
        let supporter = footprint
            .iter()
            .flat_map(|&c| state.map().armies_at(c).to_vec())
            .find(|&a| state.army(a).is_some_and(|army| army.owner == building_owner));
        let support_side = supporter.and_then(|a| army_side(state, a));

        // Attacker output, resisted by the building's armor.
        let raw = attacker_damage_triple(state, &attacker).apply_armor(building_armor);
        let multiplier = attacker_multiplier(state, &attacker, TargetCategory::Building)
            - terrain_bonus;
        let effective = scale(raw, multiplier);

        let cap = to_u32(Fixed::from_num(i64::from(building_health)) * self.config.max_casualty_fraction);
        let damage = effective.min(cap.max(1));

        // Return fire from the building and any supporter.
        let mut return_fire = scale(
            building_attack.apply_armor(roster_armor(&attacker.roster)),
            Fixed::ONE,
        );
        if let Some(support) = &support_side {
            return_fire += side_damage(state, support, &attacker.roster, attacker.coord);
        }
        let attacker_losses = self.apply_army_casualties(
            state,
            attacker.army,
            scale_down(return_fire, defense_mitigation(state, attacker.army)),
            changes,
        );

        let destroyed = state
            .building_mut(building_id)
            .is_some_and(|b| b.apply_damage(damage));
        if let Some(b) = state.building(building_id) {
            changes.record(StateChange::BuildingDamaged {
                building: building_id,
                health: b.health,
            });
        }
        changes.record(StateChange::EngagementResolved {
            engagement: id,
            attacker_casualties: attacker_losses,
            defender_casualties: damage,
        });

        let attacker_wiped = state.army(attacker.army).map_or(true, |a| a.size() == 0);
        if attacker_wiped {
            remove_wiped_army(state, attacker.army, changes);
            self.finish_between(
                state,
                id,
                Some(building_owner),
                attacker.commander,
                None,
                changes,
            );
            return;
        }
        if destroyed {
            if state.remove_building(building_id).is_ok() {
                changes.record(StateChange::BuildingRemoved {
                    building: building_id,
                });
            }
            self.finish_between(state, id, Some(attacker.owner), attacker.commander, None, changes);
        } else if let Some(e) = self.engagements.get_mut(id) {
            e.phase = EngagementPhase::Engaged;
        }
    }

    fn exchange_villagers(
        &mut self,
        state: &mut GameState,
        id: EngagementId,
        attacker: SideSnapshot,
        group_id: VillagerGroupId,
        changes: &mut ChangeBuilder,
    ) {
        let Some(group) = state.villagers(group_id) else {
            return;
        };
        let strength = group.size * VILLAGER_STRENGTH;
        if strength == 0 {
            self.finish(state, id, Some(attacker.owner), changes);
            return;
        }

        let raw = attacker_damage_triple(state, &attacker).apply_armor(crate::units::DamageTriple::new(0, 0, 0));
        let effective = scale(
            raw,
            attacker_multiplier(state, &attacker, TargetCategory::Building),
        );
        let fraction = (Fixed::from_num(i64::from(effective))
            / Fixed::from_num(i64::from(strength)))
        .min(self.config.max_casualty_fraction);

        let floor = self.config.casualty_floor;
        let losses = {
            let Some(group) = state.villagers_mut(group_id) else {
                return;
            };
            let mut lost = to_u32(Fixed::from_num(i64::from(group.size)) * fraction);
            if lost == 0 {
                lost = floor;
            }
            let lost = lost.min(group.size);
            group.size -= lost;
            lost
        };
        changes.record(StateChange::EngagementResolved {
            engagement: id,
            attacker_casualties: 0,
            defender_casualties: losses,
        });

        let wiped = state.villagers(group_id).map_or(true, |g| g.size == 0);
        if wiped {
            if state.remove_villagers(group_id).is_ok() {
                changes.record(StateChange::VillagersRemoved { group: group_id });
            }
            self.finish_between(state, id, Some(attacker.owner), attacker.commander, None, changes);
        } else if losses == 0 {
            // Rounding spares the group every tick; break off.
            self.finish_between(state, id, None, attacker.commander, None, changes);
        } else if let Some(e) = self.engagements.get_mut(id) {
            e.phase = EngagementPhase::Engaged;
        }
    }

    /// Remove units from an army in proportion to incoming damage.
    fn apply_army_casualties(
        &self,
        state: &mut GameState,
        army_id: ArmyId,
        incoming: u32,
        changes: &mut ChangeBuilder,
    ) -> u32 {
        let Some(army) = state.army_mut(army_id) else {
            return 0;
        };
        let strength = roster_strength(&army.roster);
        if strength == 0 || incoming == 0 {
            return 0;
        }
        let fraction = (Fixed::from_num(i64::from(incoming)) / Fixed::from_num(i64::from(strength)))
            .min(self.config.max_casualty_fraction);
        let lost = roster_casualties(&mut army.roster, fraction, self.config.casualty_floor);
        if lost > 0 {
            changes.record(StateChange::ArmyRosterChanged { army: army_id });
        }
        lost
    }

    /// End an engagement using live commander lookups. Only valid
    /// while both sides are still registered; exchanges that remove a
    /// wiped side call [`Self::finish_between`] with snapshot ids.
    fn finish(
        &mut self,
        state: &mut GameState,
        id: EngagementId,
        victor: Option<PlayerId>,
        changes: &mut ChangeBuilder,
    ) {
        let Some(engagement) = self.engagements.get(id) else {
            return;
        };
        let attacker = engagement.attacker;
        let attacker_commander = state.army(attacker).and_then(|a| a.commander);
        let defender_commander = match engagement.target {
            AttackTarget::Army { army } => state.army(army).and_then(|a| a.commander),
            AttackTarget::Building { .. } | AttackTarget::Villagers { .. } => None,
        };
        self.finish_between(state, id, victor, attacker_commander, defender_commander, changes);
    }

    /// End an engagement, releasing both sides and awarding experience
    /// to the commanders captured before any wiped army was removed.
    fn finish_between(
        &mut self,
        state: &mut GameState,
        id: EngagementId,
        victor: Option<PlayerId>,
        attacker_commander: Option<CommanderId>,
        defender_commander: Option<CommanderId>,
        changes: &mut ChangeBuilder,
    ) {
        let Some(engagement) = self.engagements.get_mut(id) else {
            return;
        };
        engagement.phase = EngagementPhase::Ended;
        let attacker = engagement.attacker;
        let attacker_owner = engagement.attacker_owner;
        let target = engagement.target;

        release_army(state, attacker, id);
        if let AttackTarget::Army { army } = target {
            release_army(state, army, id);
        }

        if let Some(won) = victor {
            let (winner, loser) = if won == attacker_owner {
                (attacker_commander, defender_commander)
            } else {
                (defender_commander, attacker_commander)
            };
            award_xp(state, winner, XP_VICTORY, changes);
            award_xp(state, loser, XP_DEFEAT, changes);
        }

        changes.record(StateChange::EngagementEnded {
            engagement: id,
            victor,
        });
    }
}

/// A read-only snapshot of one army's fighting strength.
struct SideSnapshot {
    army: ArmyId,
    owner: PlayerId,
    coord: HexCoord,
    roster: UnitRoster,
    commander: Option<CommanderId>,
}

fn army_side(state: &GameState, id: ArmyId) -> Option<SideSnapshot> {
    let army = state.army(id)?;
    if roster_size(&army.roster) == 0 {
        return None;
    }
    Some(SideSnapshot {
        army: id,
        owner: army.owner,
        coord: army.coord,
        roster: army.roster.clone(),
        commander: army.commander,
    })
}

fn attacker_damage_triple(state: &GameState, side: &SideSnapshot) -> crate::units::DamageTriple {
    let upgrades = state
        .player(side.owner)
        .map(|p| p.unit_upgrades.clone())
        .unwrap_or_default();
    roster_attack(&side.roster, &upgrades)
}

fn attacker_multiplier(state: &GameState, side: &SideSnapshot, target: TargetCategory) -> Fixed {
    let mut multiplier = Fixed::ONE + roster_bonus(&side.roster).against(target);
    if let Some(c) = side.commander.and_then(|c| state.commander(c)) {
        multiplier += c.attack_bonus();
    }
    multiplier.max(Fixed::ZERO)
}

/// Effective damage one side deals to a defending roster on a tile.
fn side_damage(
    state: &GameState,
    side: &SideSnapshot,
    defender_roster: &UnitRoster,
    defender_coord: HexCoord,
) -> u32 {
    let target = dominant_category(defender_roster)
        .map_or(TargetCategory::Building, TargetCategory::Unit);
    let raw = attacker_damage_triple(state, side).apply_armor(roster_armor(defender_roster));
    let penalty = state
        .map()
        .tile(defender_coord)
        .map_or(Fixed::ZERO, |t| t.terrain.attacker_penalty());
    let multiplier = (attacker_multiplier(state, side, target) - penalty).max(Fixed::ZERO);
    scale(raw, multiplier)
}

/// Total incoming-damage mitigation for an army: terrain, entrenchment
/// and a defense-specialist commander.
fn defense_mitigation(state: &GameState, id: ArmyId) -> Fixed {
    let Some(army) = state.army(id) else {
        return Fixed::ZERO;
    };
    let mut mitigation = state
        .map()
        .tile(army.coord)
        .map_or(Fixed::ZERO, |t| t.terrain.defender_bonus());
    if army.entrenchment.is_entrenched() {
        mitigation += entrench_bonus();
    }
    if let Some(c) = army.commander.and_then(|c| state.commander(c)) {
        mitigation += c.defense_bonus();
    }
    mitigation
}

/// Remove a fraction of every unit type. When rounding spares everyone
/// and a casualty floor is configured, the largest contingent pays it.
fn roster_casualties(roster: &mut UnitRoster, fraction: Fixed, floor: u32) -> u32 {
    if fraction <= Fixed::ZERO {
        return 0;
    }
    let mut total = 0;
    for count in roster.values_mut() {
        let lost = to_u32(Fixed::from_num(i64::from(*count)) * fraction).min(*count);
        *count -= lost;
        total += lost;
    }
    if total == 0 && floor > 0 {
        if let Some((_, count)) = roster
            .iter_mut()
            .max_by(|a, b| (*a.1).cmp(b.1).then(b.0.cmp(a.0)))
        {
            let lost = floor.min(*count);
            *count -= lost;
            total = lost;
        }
    }
    roster.retain(|_, count| *count > 0);
    total
}

fn release_army(state: &mut GameState, id: ArmyId, engagement: EngagementId) {
    if let Some(army) = state.army_mut(id) {
        if army.engagement == Some(engagement) {
            army.engagement = None;
        }
    }
}

fn remove_wiped_army(state: &mut GameState, id: ArmyId, changes: &mut ChangeBuilder) {
    if state.remove_army(id).is_ok() {
        changes.record(StateChange::ArmyRemoved { army: id });
    }
}

fn award_xp(
    state: &mut GameState,
    commander: Option<CommanderId>,
    amount: u32,
    changes: &mut ChangeBuilder,
) {
    let Some(id) = commander else {
        return;
    };
    if let Some(c) = state.commander_mut(id) {
        let before = c.level;
        c.grant_xp(amount);
        if c.level != before {
            let level = c.level;
            changes.record(StateChange::CommanderLeveled {
                commander: id,
                level,
            });
        }
    }
}

/// Completed defensive structures of the same owner whose protection
/// radius covers `building`. All must fall before it can be targeted.
#[must_use]
pub fn protectors_of(state: &GameState, building: BuildingId) -> Vec<BuildingId> {
    let Some(target) = state.building(building) else {
        return Vec::new();
    };
    let mut protectors = Vec::new();
    for id in state.building_ids() {
        if id == building {
            continue;
        }
        let Some(candidate) = state.building(id) else {
            continue;
        };
        if candidate.owner != target.owner || !candidate.is_completed() {
            continue;
        }
        let Some(range) = candidate.kind.protection_range() else {
            continue;
        };
        if candidate.anchor.distance(target.anchor) <= range {
            protectors.push(id);
        }
    }
    protectors
}

fn scale(raw: u32, multiplier: Fixed) -> u32 {
    to_u32(Fixed::from_num(i64::from(raw)) * multiplier.max(Fixed::ZERO))
}

fn scale_down(raw: u32, mitigation: Fixed) -> u32 {
    scale(raw, Fixed::ONE - mitigation)
}

fn to_u32(value: Fixed) -> u32 {
    if value <= Fixed::ZERO {
        0
    } else {
        value.to_num::<i64>().min(i64::from(u32::MAX)) as u32
    }
}
