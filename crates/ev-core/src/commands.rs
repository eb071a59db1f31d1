use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandTag {
    FlowControl,
    MusicSound,
    Portrait,
    BackgroundForeground,
    DialogueText,
    CursorCamera,
    LevelVars,
    GameVars,
    Tilemap,
    Region,
    Units,
    UnitProperties,
    ItemProperties,
    UnitGroups,
    Miscellaneous,
    Overworld,
    Hidden,
}

/// What the compiler and analyzer need to know about a command beyond its
/// parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandRole {
    #[default]
    Plain,
    /// Persists the whole game; forbidden inside `for` loops of pyev1 events.
    SavePoint,
    /// Starts another event by name (first positional argument).
    EventCall,
    /// Structural keyword of the legacy dialect; not callable from pyev1.
    Block,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandDescriptor {
    pub id: String,
    pub alias: Option<String>,
    pub tag: CommandTag,
    pub keywords: Vec<String>,
    pub optional_keywords: Vec<String>,
    pub flags: Vec<String>,
    pub desc: String,
    pub role: CommandRole,
}

impl CommandDescriptor {
    pub fn new(id: impl Into<String>, tag: CommandTag) -> Self {
        Self {
            id: id.into(),
            alias: None,
            tag,
            keywords: Vec::new(),
            optional_keywords: Vec::new(),
            flags: Vec::new(),
            desc: String::new(),
            role: CommandRole::Plain,
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn keywords(mut self, names: &[&str]) -> Self {
        self.keywords = names.iter().map(|name| name.to_string()).collect();
        self
    }

    pub fn optional_keywords(mut self, names: &[&str]) -> Self {
        self.optional_keywords = names.iter().map(|name| name.to_string()).collect();
        self
    }

    pub fn flags(mut self, names: &[&str]) -> Self {
        self.flags = names.iter().map(|name| name.to_string()).collect();
        self
    }

    pub fn role(mut self, role: CommandRole) -> Self {
        self.role = role;
        self
    }

    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = desc.into();
        self
    }

    /// Parameter names in binding order (required then optional). Repeated
    /// names get a numeric suffix so every slot has a distinct key:
    /// `change_tilemap` binds `Tilemap` and `Tilemap2`.
    pub fn parameter_slots(&self) -> Vec<String> {
        let mut seen: BTreeMap<&str, usize> = BTreeMap::new();
        self.keywords
            .iter()
            .chain(self.optional_keywords.iter())
            .map(|name| {
                let count = seen.entry(name.as_str()).or_insert(0);
                *count += 1;
                if *count == 1 {
                    name.clone()
                } else {
                    format!("{}{}", name, count)
                }
            })
            .collect()
    }

    pub fn accepts_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|known| known == flag)
    }
}

/// Closed catalogue of event commands, looked up by id or alias. Built once
/// and never mutated; callers wanting extra commands build their own
/// registry from [`builtin_descriptors`] plus their additions.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    descriptors: Vec<CommandDescriptor>,
    by_id: BTreeMap<String, usize>,
    by_alias: BTreeMap<String, usize>,
}

impl CommandRegistry {
    /// Later descriptors with an id already taken are ignored, so an
    /// injected catalogue cannot shadow an earlier entry.
    pub fn new(descriptors: Vec<CommandDescriptor>) -> Self {
        let mut kept = Vec::with_capacity(descriptors.len());
        let mut by_id = BTreeMap::new();
        let mut by_alias = BTreeMap::new();
        for descriptor in descriptors {
            if by_id.contains_key(&descriptor.id) {
                continue;
            }
            let index = kept.len();
            by_id.insert(descriptor.id.clone(), index);
            if let Some(alias) = &descriptor.alias {
                by_alias.entry(alias.clone()).or_insert(index);
            }
            kept.push(descriptor);
        }
        Self {
            descriptors: kept,
            by_id,
            by_alias,
        }
    }

    pub fn builtin() -> &'static CommandRegistry {
        shared_builtin().as_ref()
    }

    /// The builtin catalogue as an owned handle, for processors that keep
    /// their registry.
    pub fn shared() -> Arc<CommandRegistry> {
        Arc::clone(shared_builtin())
    }

    pub fn get(&self, id_or_alias: &str) -> Option<&CommandDescriptor> {
        self.by_id
            .get(id_or_alias)
            .or_else(|| self.by_alias.get(id_or_alias))
            .map(|index| &self.descriptors[*index])
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn is_python_callable(&self, id_or_alias: &str) -> bool {
        self.get(id_or_alias)
            .is_some_and(|descriptor| descriptor.role != CommandRole::Block)
    }

    pub fn is_save_point(&self, id_or_alias: &str) -> bool {
        self.get(id_or_alias)
            .is_some_and(|descriptor| descriptor.role == CommandRole::SavePoint)
    }

    pub fn is_event_call(&self, id_or_alias: &str) -> bool {
        self.get(id_or_alias)
            .is_some_and(|descriptor| descriptor.role == CommandRole::EventCall)
    }
}

fn shared_builtin() -> &'static Arc<CommandRegistry> {
    static BUILTIN: OnceLock<Arc<CommandRegistry>> = OnceLock::new();
    BUILTIN.get_or_init(|| Arc::new(CommandRegistry::new(builtin_descriptors())))
}

pub fn builtin_descriptors() -> Vec<CommandDescriptor> {
    vec![
        CommandDescriptor::new("comment", CommandTag::FlowControl)
            .alias("#")
            .role(CommandRole::Block)
            .desc("Lines starting with # are ignored by the processor."),
        CommandDescriptor::new("if", CommandTag::FlowControl)
            .keywords(&["Condition"])
            .role(CommandRole::Block)
            .desc("If the Condition returns true, the block under this command will be executed."),
        CommandDescriptor::new("elif", CommandTag::FlowControl)
            .keywords(&["Condition"])
            .role(CommandRole::Block)
            .desc("Works exactly like the if statement, but is called only if the previous if or elif returned false."),
        CommandDescriptor::new("else", CommandTag::FlowControl)
            .role(CommandRole::Block)
            .desc("Defines a block to be executed only if the previous if or elif returned false."),
        CommandDescriptor::new("end", CommandTag::FlowControl)
            .role(CommandRole::Block)
            .desc("Ends a conditional block."),
        CommandDescriptor::new("for", CommandTag::FlowControl)
            .keywords(&["Nid", "Expression"])
            .flags(&["no_warn"])
            .role(CommandRole::Block)
            .desc("The Expression will be evaluated, and it should return a list of strings."),
        CommandDescriptor::new("endf", CommandTag::FlowControl)
            .role(CommandRole::Block)
            .desc("Ends a for block."),
        CommandDescriptor::new("break", CommandTag::FlowControl)
            .desc("Immediately ends the current event."),
        CommandDescriptor::new("wait", CommandTag::FlowControl)
            .keywords(&["Time"])
            .desc("Pauses the execution of the script for Time milliseconds."),
        CommandDescriptor::new("end_skip", CommandTag::FlowControl)
            .desc("If the player was skipping through the event script, stop the skip here."),
        CommandDescriptor::new("music", CommandTag::MusicSound)
            .alias("m")
            .keywords(&["Music"])
            .optional_keywords(&["Time"])
            .desc("Fades in Music over the course of Time milliseconds."),
        CommandDescriptor::new("music_clear", CommandTag::MusicSound)
            .optional_keywords(&["Time"])
            .desc("Fades out the currently playing song over the course of Time milliseconds."),
        CommandDescriptor::new("sound", CommandTag::MusicSound)
            .keywords(&["Sound"])
            .optional_keywords(&["Volume"])
            .desc("Plays the Sound once."),
        CommandDescriptor::new("change_music", CommandTag::MusicSound)
            .keywords(&["PhaseMusic", "Music"])
            .desc("Changes the phase theme music."),
        CommandDescriptor::new("add_portrait", CommandTag::Portrait)
            .alias("u")
            .keywords(&["Portrait", "ScreenPosition"])
            .optional_keywords(&["Slide", "ExpressionList", "VerticalScreenPosition"])
            .flags(&["mirror", "low_priority", "immediate", "no_block"])
            .desc("Adds a portrait to the screen."),
        CommandDescriptor::new("multi_add_portrait", CommandTag::Portrait)
            .alias("uu")
            .keywords(&["Portrait", "ScreenPosition", "Portrait", "ScreenPosition"])
            .optional_keywords(&["Portrait", "ScreenPosition", "Portrait", "ScreenPosition"])
            .desc("Adds more than one portrait to the screen at the same time."),
        CommandDescriptor::new("remove_portrait", CommandTag::Portrait)
            .alias("r")
            .keywords(&["Portrait"])
            .flags(&["immediate", "no_block"])
            .desc("Removes a portrait from the screen."),
        CommandDescriptor::new("multi_remove_portrait", CommandTag::Portrait)
            .alias("rr")
            .keywords(&["Portrait", "Portrait"])
            .optional_keywords(&["Portrait", "Portrait"])
            .desc("Removes multiple portraits from the screen simultaneously."),
        CommandDescriptor::new("move_portrait", CommandTag::Portrait)
            .keywords(&["Portrait", "ScreenPosition"])
            .flags(&["immediate", "no_block"])
            .desc("Causes a portrait to"),
        CommandDescriptor::new("bop_portrait", CommandTag::Portrait)
            .alias("bop")
            .keywords(&["Portrait"])
            .flags(&["no_block"])
            .desc("Causes a portrait to briefly bob up and down."),
        CommandDescriptor::new("expression", CommandTag::Portrait)
            .alias("e")
            .keywords(&["Portrait", "ExpressionList"])
            .desc("Changes a portrait"),
        CommandDescriptor::new("speak_style", CommandTag::DialogueText)
            .keywords(&["NID"])
            .optional_keywords(&["Speaker", "TextPosition", "Width", "DialogVariant", "Float"])
            .flags(&["low_priority", "hold", "no_popup", "fit"])
            .desc("Automatically formats all `speak` commands with NID equal to the style"),
        CommandDescriptor::new("speak", CommandTag::DialogueText)
            .alias("s")
            .keywords(&["Speaker", "Text"])
            .optional_keywords(&["TextPosition", "Width", "DialogVariant", "Nid", "Float"])
            .flags(&["low_priority", "hold", "no_popup", "fit", "no_block"])
            .desc("Causes the Speaker to speak some Text."),
        CommandDescriptor::new("unhold", CommandTag::DialogueText)
            .keywords(&["NID"])
            .desc("Remove a speak command from the screen."),
        CommandDescriptor::new("narrate", CommandTag::DialogueText)
            .keywords(&["Speaker", "Text"])
            .flags(&["no_block"])
            .desc("Causes text to be displayed in the whole-screen narration frame."),
        CommandDescriptor::new("transition", CommandTag::BackgroundForeground)
            .alias("t")
            .optional_keywords(&["Direction", "Speed", "Color3"])
            .desc("If a scene is currently displayed, it is faded out to a black screen."),
        CommandDescriptor::new("change_background", CommandTag::BackgroundForeground)
            .alias("b")
            .optional_keywords(&["Panorama"])
            .flags(&["keep_portraits"])
            .desc("Changes the dialogue scene"),
        CommandDescriptor::new("disp_cursor", CommandTag::CursorCamera)
            .keywords(&["Bool"])
            .desc("Toggles whether the game"),
        CommandDescriptor::new("move_cursor", CommandTag::CursorCamera)
            .alias("set_cursor")
            .keywords(&["Position"])
            .optional_keywords(&["Speed"])
            .flags(&["immediate"])
            .desc("Moves the cursor to the map coordinate given by Position."),
        CommandDescriptor::new("center_cursor", CommandTag::CursorCamera)
            .keywords(&["Position"])
            .optional_keywords(&["Speed"])
            .flags(&["immediate"])
            .desc("Similar to move_cursor except that it attempts to center the screen on the new cursor position to the greatest extent possible."),
        CommandDescriptor::new("flicker_cursor", CommandTag::CursorCamera)
            .alias("highlight")
            .keywords(&["Position"])
            .flags(&["immediate"])
            .desc("Causes the cursor to briefly blink on and off at the indicated Position."),
        CommandDescriptor::new("game_var", CommandTag::GameVars)
            .alias("set")
            .keywords(&["Nid", "Condition"])
            .desc("Creates a game variable or changes its value."),
        CommandDescriptor::new("inc_game_var", CommandTag::GameVars)
            .alias("inc")
            .keywords(&["Nid"])
            .optional_keywords(&["Condition"])
            .desc("Increments a game variable by one, or by a Python expression provided using the Condition optional keyword."),
        CommandDescriptor::new("level_var", CommandTag::LevelVars)
            .keywords(&["Nid", "Condition"])
            .desc("Creates a level-specific variable or changes its value."),
        CommandDescriptor::new("inc_level_var", CommandTag::LevelVars)
            .keywords(&["Nid"])
            .optional_keywords(&["Condition"])
            .desc("Increments a level variable by one, or by a Python expression provided using the Condition optional keyword."),
        CommandDescriptor::new("win_game", CommandTag::LevelVars)
            .desc("Ends the current chapter in victory."),
        CommandDescriptor::new("lose_game", CommandTag::LevelVars)
            .desc("Ends the current chapter in defeat."),
        CommandDescriptor::new("activate_turnwheel", CommandTag::Miscellaneous)
            .optional_keywords(&["Bool"])
            .desc("Brings up the turnwheel interface to allow the player to roll back turns."),
        CommandDescriptor::new("battle_save", CommandTag::Miscellaneous)
            .role(CommandRole::SavePoint)
            .desc("The player is given the option of saving the game mid-battle."),
        CommandDescriptor::new("change_tilemap", CommandTag::Tilemap)
            .optional_keywords(&["Tilemap", "PositionOffset", "Tilemap"])
            .flags(&["reload"])
            .desc("Changes the current map to a different layout (Tilemap)."),
        CommandDescriptor::new("load_unit", CommandTag::Units)
            .keywords(&["UniqueUnit"])
            .optional_keywords(&["Team", "AI"])
            .desc("Loads a unique (non-generic) unit from memory."),
        CommandDescriptor::new("make_generic", CommandTag::Units)
            .keywords(&["String", "Klass", "String", "Team"])
            .optional_keywords(&["AI", "Faction", "String", "ItemList"])
            .desc("Fabricates a new generic unit from scratch."),
        CommandDescriptor::new("create_unit", CommandTag::Units)
            .keywords(&["Unit"])
            .optional_keywords(&["String", "Condition", "Position", "EntryType", "Placement"])
            .desc("Creates a new instance of a unit and, optionally, places it on the map."),
        CommandDescriptor::new("add_unit", CommandTag::Units)
            .alias("add")
            .keywords(&["Unit"])
            .optional_keywords(&["Position", "EntryType", "Placement"])
            .desc("Places Unit on the map."),
        CommandDescriptor::new("move_unit", CommandTag::Units)
            .alias("move")
            .keywords(&["Unit"])
            .optional_keywords(&["Position", "MovementType", "Placement"])
            .flags(&["no_block", "no_follow"])
            .desc("Causes Unit to move to a new position on the map."),
        CommandDescriptor::new("remove_unit", CommandTag::Units)
            .alias("remove")
            .keywords(&["Unit"])
            .optional_keywords(&["RemoveType"])
            .desc("Removes Unit from the map."),
        CommandDescriptor::new("kill_unit", CommandTag::Units)
            .alias("kill")
            .keywords(&["Unit"])
            .flags(&["immediate"])
            .desc("Causes Unit to be removed from the map and marked as dead."),
        CommandDescriptor::new("remove_all_units", CommandTag::Units)
            .desc("Removes all units from the map."),
        CommandDescriptor::new("remove_all_enemies", CommandTag::Units)
            .desc("Removes all units in the enemy team from the map."),
        CommandDescriptor::new("interact_unit", CommandTag::Units)
            .alias("interact")
            .keywords(&["Unit", "Position"])
            .optional_keywords(&["CombatScript", "Ability", "PositiveInteger"])
            .flags(&["arena", "force_animation"])
            .desc("Initiates a battle."),
        CommandDescriptor::new("set_name", CommandTag::UnitProperties)
            .keywords(&["Unit", "String"])
            .desc("Sets Unit"),
        CommandDescriptor::new("set_current_hp", CommandTag::UnitProperties)
            .keywords(&["Unit", "PositiveInteger"])
            .desc("Sets Unit"),
        CommandDescriptor::new("set_current_mana", CommandTag::UnitProperties)
            .keywords(&["Unit", "PositiveInteger"])
            .desc("Sets Unit"),
        CommandDescriptor::new("add_fatigue", CommandTag::UnitProperties)
            .keywords(&["Unit", "Integer"])
            .desc("Modify Unit"),
        CommandDescriptor::new("set_unit_field", CommandTag::UnitProperties)
            .keywords(&["Unit", "String", "String"])
            .flags(&["increment_mode"])
            .desc("Set arbitrary property on _Unit_."),
        CommandDescriptor::new("resurrect", CommandTag::Units)
            .keywords(&["GlobalUnit"])
            .desc("Brings a dead unit back to life."),
        CommandDescriptor::new("reset", CommandTag::UnitProperties)
            .keywords(&["Unit"])
            .desc("Refreshes the unit so that it can act again this turn."),
        CommandDescriptor::new("has_attacked", CommandTag::UnitProperties)
            .keywords(&["Unit"])
            .desc("Sets the unit"),
        CommandDescriptor::new("has_traded", CommandTag::UnitProperties)
            .keywords(&["Unit"])
            .desc("Sets the unit"),
        CommandDescriptor::new("add_group", CommandTag::UnitGroups)
            .keywords(&["Group"])
            .optional_keywords(&["StartingGroup", "EntryType", "Placement"])
            .flags(&["create"])
            .desc("Adds a unit group to the map."),
        CommandDescriptor::new("spawn_group", CommandTag::UnitGroups)
            .keywords(&["Group", "CardinalDirection", "StartingGroup"])
            .optional_keywords(&["EntryType", "Placement"])
            .flags(&["create", "no_block", "no_follow"])
            .desc("Causes a unit Group to arrive on the map from one of the CardinalDirections."),
        CommandDescriptor::new("move_group", CommandTag::UnitGroups)
            .alias("morph_group")
            .keywords(&["Group", "StartingGroup"])
            .optional_keywords(&["MovementType", "Placement"])
            .flags(&["no_block", "no_follow"])
            .desc("Causes a unit Group to move to a new set of map positions specified using a different group"),
        CommandDescriptor::new("remove_group", CommandTag::UnitGroups)
            .keywords(&["Group"])
            .optional_keywords(&["RemoveType"])
            .desc("Removes a unit Group from the map."),
        CommandDescriptor::new("give_item", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit", "Item"])
            .flags(&["no_banner", "no_choice", "droppable"])
            .desc("Gives a new copy of Item to GlobalUnit."),
        CommandDescriptor::new("remove_item", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit", "Item"])
            .flags(&["no_banner"])
            .desc("Removes Item from the inventory of GlobalUnit."),
        CommandDescriptor::new("change_item_name", CommandTag::ItemProperties)
            .keywords(&["GlobalUnit", "Item", "Text"])
            .desc("Changes the name of Item in the inventory of GlobalUnit to Text."),
        CommandDescriptor::new("change_item_desc", CommandTag::ItemProperties)
            .keywords(&["GlobalUnit", "Item", "Text"])
            .desc("Changes the description of Item in the inventory of GlobalUnit to Text."),
        CommandDescriptor::new("add_item_to_multiitem", CommandTag::ItemProperties)
            .keywords(&["GlobalUnit", "Item", "Item"])
            .desc("Adds a new item to an existing multi-item in the inventory of GlobalUnit."),
        CommandDescriptor::new("remove_item_from_multiitem", CommandTag::ItemProperties)
            .keywords(&["GlobalUnit", "Item", "Item"])
            .desc("Removes an item from an existing multi-item in the inventory of GlobalUnit."),
        CommandDescriptor::new("give_money", CommandTag::GameVars)
            .keywords(&["Integer"])
            .optional_keywords(&["Party"])
            .flags(&["no_banner"])
            .desc("Gives Integer amount of money to the indicated Party."),
        CommandDescriptor::new("give_bexp", CommandTag::GameVars)
            .keywords(&["Condition"])
            .optional_keywords(&["Party", "Text"])
            .flags(&["no_banner"])
            .desc("Gives bonus experience of the amount defined by Condition (can just be a number) to the indicated Party."),
        CommandDescriptor::new("give_exp", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit", "PositiveInteger"])
            .desc("Gives a PositiveInteger amount of experience to GlobalUnit."),
        CommandDescriptor::new("set_exp", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit", "PositiveInteger"])
            .desc("Sets GlobalUnit"),
        CommandDescriptor::new("give_wexp", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit", "WeaponType", "Integer"])
            .flags(&["no_banner"])
            .desc("Gives a PositiveInteger amount of weapon experience in WeaponType to GlobalUnit."),
        CommandDescriptor::new("give_skill", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit", "Skill"])
            .flags(&["no_banner"])
            .desc("GlobalUnit gains Skill."),
        CommandDescriptor::new("remove_skill", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit", "Skill"])
            .flags(&["no_banner"])
            .desc("GlobalUnit loses Skill."),
        CommandDescriptor::new("change_ai", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit", "AI"])
            .desc("Sets the AI used by GlobalUnit."),
        CommandDescriptor::new("change_party", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit", "Party"])
            .desc("Changes the Party of GlobalUnit."),
        CommandDescriptor::new("change_team", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit", "Team"])
            .desc("Changes GlobalUnit"),
        CommandDescriptor::new("change_portrait", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit", "PortraitNid"])
            .desc("Changes GlobalUnit"),
        CommandDescriptor::new("change_stats", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit", "StatList"])
            .flags(&["immediate"])
            .desc("Changes the stats (STR, SKL, etc.) of GlobalUnit."),
        CommandDescriptor::new("set_stats", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit", "StatList"])
            .flags(&["immediate"])
            .desc("Sets the stats (STR, SKL, etc.) of GlobalUnit to specific values defined in StatList."),
        CommandDescriptor::new("change_growths", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit", "StatList"])
            .desc("Changes the growths (STR, SKL, etc.) of GlobalUnit."),
        CommandDescriptor::new("set_growths", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit", "StatList"])
            .desc("Sets the growths (STR, SKL, etc.) of GlobalUnit to specific values defined in StatList."),
        CommandDescriptor::new("autolevel_to", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit", "Condition"])
            .flags(&["hidden"])
            .desc("Levels GlobalUnit up to a level specified by Condition."),
        CommandDescriptor::new("set_mode_autolevels", CommandTag::GameVars)
            .keywords(&["Condition"])
            .flags(&["hidden"])
            .desc("Changes the number of additional levels that enemy units gain from the difficulty mode setting."),
        CommandDescriptor::new("promote", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit"])
            .optional_keywords(&["Klass"])
            .desc("Promotes GlobalUnit into a specified class (Klass) or, if no Klass is given, the unit promotes as normal using its promotion data."),
        CommandDescriptor::new("change_class", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit"])
            .optional_keywords(&["Klass"])
            .flags(&["silent"])
            .desc("Changes GlobalUnit into a specified class (Klass) or, if no Klass is given, the unit class changes as normal using its alternative class data."),
        CommandDescriptor::new("add_tag", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit", "Tag"])
            .desc("Adds a Tag to GlobalUnit."),
        CommandDescriptor::new("remove_tag", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit", "Tag"])
            .desc("Removes a Tag from GlobalUnit."),
        CommandDescriptor::new("add_talk", CommandTag::LevelVars)
            .keywords(&["Unit", "Unit"])
            .desc("Adds the ability for the two indicated units to"),
        CommandDescriptor::new("remove_talk", CommandTag::LevelVars)
            .keywords(&["Unit", "Unit"])
            .desc("Removes the ability for the two indicated units to"),
        CommandDescriptor::new("add_lore", CommandTag::GameVars)
            .alias("unlock_lore")
            .keywords(&["Lore"])
            .desc("Unlocks the player"),
        CommandDescriptor::new("remove_lore", CommandTag::GameVars)
            .keywords(&["Lore"])
            .desc("Removes the player"),
        CommandDescriptor::new("add_base_convo", CommandTag::LevelVars)
            .keywords(&["Text"])
            .desc("Unlocks a base conversation specified by Text for later viewing by the player."),
        CommandDescriptor::new("ignore_base_convo", CommandTag::LevelVars)
            .keywords(&["Text"])
            .desc("Sets the base conversation specified by Text to unselectable and greyed-out, but still visible."),
        CommandDescriptor::new("remove_base_convo", CommandTag::LevelVars)
            .keywords(&["Text"])
            .desc("Removes the base conversation specified by Text from the list entirely unless it is later re-added using add_base_convo."),
        CommandDescriptor::new("increment_support_points", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit", "GlobalUnit", "PositiveInteger"])
            .desc("Adds PositiveInteger amount of support points between the two specified units."),
        CommandDescriptor::new("unlock_support_rank", CommandTag::UnitProperties)
            .keywords(&["GlobalUnit", "GlobalUnit", "SupportRank"])
            .desc("Unlocks the specific SupportRank between the two specified units."),
        CommandDescriptor::new("add_market_item", CommandTag::GameVars)
            .keywords(&["Item"])
            .desc("Adds Item to the list of purchaseable goods in the base"),
        CommandDescriptor::new("remove_market_item", CommandTag::GameVars)
            .keywords(&["Item"])
            .desc("Removes Item from the list of purchaseable goods in the base"),
        CommandDescriptor::new("add_region", CommandTag::Region)
            .keywords(&["Nid", "Position", "Size", "RegionType"])
            .optional_keywords(&["String"])
            .flags(&["only_once"])
            .desc("Adds a new region to the map that can be referenced by events."),
        CommandDescriptor::new("region_condition", CommandTag::Region)
            .keywords(&["Nid", "Condition"])
            .desc("Modifies the trigger Condition for the event-type region specified by Nid."),
        CommandDescriptor::new("remove_region", CommandTag::Region)
            .keywords(&["Nid"])
            .desc("Removes the region specified by Nid."),
        CommandDescriptor::new("show_layer", CommandTag::Tilemap)
            .keywords(&["Layer"])
            .optional_keywords(&["LayerTransition"])
            .desc("Causes the specified map Layer to be displayed."),
        CommandDescriptor::new("hide_layer", CommandTag::Tilemap)
            .keywords(&["Layer"])
            .optional_keywords(&["LayerTransition"])
            .desc("Causes the specified map Layer to be hidden."),
        CommandDescriptor::new("add_weather", CommandTag::Tilemap)
            .keywords(&["Weather"])
            .optional_keywords(&["Position"])
            .desc("Adds the specified Weather to the current map."),
        CommandDescriptor::new("remove_weather", CommandTag::Tilemap)
            .keywords(&["Weather"])
            .optional_keywords(&["Position"])
            .desc("Removes the specified Weather from the current map."),
        CommandDescriptor::new("change_objective_simple", CommandTag::LevelVars)
            .keywords(&["Text"])
            .desc("Changes the simple version of the chapter"),
        CommandDescriptor::new("change_objective_win", CommandTag::LevelVars)
            .keywords(&["Text"])
            .desc("Changes the victory condition of the chapter"),
        CommandDescriptor::new("change_objective_loss", CommandTag::LevelVars)
            .keywords(&["Text"])
            .desc("Changes the defeat condition of the chapter"),
        CommandDescriptor::new("set_position", CommandTag::Miscellaneous)
            .keywords(&["Condition"])
            .desc("Stores a given position (Condition) as the event"),
        CommandDescriptor::new("map_anim", CommandTag::Tilemap)
            .keywords(&["MapAnim", "FloatPosition"])
            .optional_keywords(&["Float"])
            .flags(&["no_block", "permanent", "blend"])
            .desc("Plays a map animation denoted by the nid MapAnim at Position."),
        CommandDescriptor::new("remove_map_anim", CommandTag::Tilemap)
            .keywords(&["MapAnim", "Position"])
            .desc("Removes a map animation denoted by the nid MapAnim at Position."),
        CommandDescriptor::new("merge_parties", CommandTag::Miscellaneous)
            .keywords(&["Party", "Party"])
            .desc("Merges two parties together."),
        CommandDescriptor::new("arrange_formation", CommandTag::Miscellaneous)
            .desc("Places units on the map"),
        CommandDescriptor::new("prep", CommandTag::Miscellaneous)
            .optional_keywords(&["Bool", "Music", "StringList", "StringList", "StringList"])
            .role(CommandRole::SavePoint)
            .desc("Display the prep screen."),
        CommandDescriptor::new("base", CommandTag::Miscellaneous)
            .keywords(&["Panorama"])
            .optional_keywords(&["Music", "StringList", "StringList", "StringList"])
            .flags(&["show_map"])
            .role(CommandRole::SavePoint)
            .desc("When called, the player is sent to the Base menu."),
        CommandDescriptor::new("shop", CommandTag::Miscellaneous)
            .keywords(&["Unit", "ItemList"])
            .optional_keywords(&["ShopFlavor"])
            .desc("Causes Unit to enter a shop that sells ItemList items."),
        CommandDescriptor::new("choice", CommandTag::Miscellaneous)
            .keywords(&["Nid", "Text", "String"])
            .optional_keywords(&["Width", "Orientation", "Align", "Sprite", "Event", "TableEntryType", "Size", "HAlign"])
            .flags(&["persist", "expression", "no_bg", "no_cursor", "arrows", "scroll_bar"])
            .desc("Presents the player with a menu in which he/she can choose from several options."),
        CommandDescriptor::new("unchoice", CommandTag::Miscellaneous)
            .desc("If this event was called from a Choice, then prevents that Choice from ending once this event ends."),
        CommandDescriptor::new("table", CommandTag::Miscellaneous)
            .keywords(&["Nid", "String"])
            .optional_keywords(&["Text", "Size", "Width", "Align", "Sprite", "TableEntryType", "HAlign"])
            .flags(&["expression", "no_bg"])
            .desc("Displays a box on screen containing some text or tabulated information."),
        CommandDescriptor::new("text_entry", CommandTag::Miscellaneous)
            .keywords(&["Nid", "Text"])
            .optional_keywords(&["Integer", "IllegalCharacterList"])
            .flags(&["force_entry"])
            .desc("Presents the player with a menu in which they can enter text."),
        CommandDescriptor::new("rmtable", CommandTag::Miscellaneous)
            .keywords(&["Nid"])
            .desc("Remove a table created by the `Table` command."),
        CommandDescriptor::new("chapter_title", CommandTag::Miscellaneous)
            .optional_keywords(&["Music", "Text"])
            .desc("Brings up the chapter title screen, optionally with the specified Music and chapter name (Text)."),
        CommandDescriptor::new("draw_overlay_sprite", CommandTag::Miscellaneous)
            .alias("draw_overlay")
            .keywords(&["String", "Sprite"])
            .optional_keywords(&["PositionOffset", "Integer", "CardinalDirection"])
            .desc("Draws a sprite on the screen at the specified position."),
        CommandDescriptor::new("remove_overlay_sprite", CommandTag::Miscellaneous)
            .alias("delete_overlay")
            .keywords(&["String"])
            .desc("Removes an overlay sprite with the given name from the screen."),
        CommandDescriptor::new("alert", CommandTag::DialogueText)
            .keywords(&["Text"])
            .desc("Displays the text given in Text in an alert box."),
        CommandDescriptor::new("alert_item", CommandTag::DialogueText)
            .keywords(&["Text", "Item"])
            .desc("Displays the text given in Text in an alert box."),
        CommandDescriptor::new("alert_skill", CommandTag::DialogueText)
            .keywords(&["Text", "Skill"]),
        CommandDescriptor::new("victory_screen", CommandTag::Miscellaneous)
            .desc("Displays the chapter"),
        CommandDescriptor::new("records_screen", CommandTag::Miscellaneous)
            .desc("Displays the game"),
        CommandDescriptor::new("location_card", CommandTag::DialogueText)
            .keywords(&["Text"])
            .desc("Used to display text (Text) in the upper-left corner of the screen."),
        CommandDescriptor::new("credits", CommandTag::DialogueText)
            .keywords(&["Text", "Text"])
            .flags(&["wait", "center", "no_split"])
            .desc("Display a line of credits."),
        CommandDescriptor::new("ending", CommandTag::DialogueText)
            .keywords(&["Portrait", "Text", "Text"])
            .desc("Displays the epilogue text for a character."),
        CommandDescriptor::new("pop_dialog", CommandTag::DialogueText)
            .desc("Removes the most recent dialog text box from the screen."),
        CommandDescriptor::new("unlock", CommandTag::Region)
            .keywords(&["Unit"])
            .desc("A convenient wrapper function that combines find_unlock and spend_unlock."),
        CommandDescriptor::new("find_unlock", CommandTag::Hidden)
            .keywords(&["Unit"])
            .desc("Use unlock instead."),
        CommandDescriptor::new("spend_unlock", CommandTag::Hidden)
            .keywords(&["Unit"])
            .desc("Use unlock instead."),
        CommandDescriptor::new("trigger_script", CommandTag::Miscellaneous)
            .keywords(&["Event"])
            .optional_keywords(&["GlobalUnit", "GlobalUnit"])
            .role(CommandRole::EventCall)
            .desc("Executes the event script specified by Event."),
        CommandDescriptor::new("trigger_script_with_args", CommandTag::Miscellaneous)
            .keywords(&["Event"])
            .optional_keywords(&["String", "String", "String", "String", "String"])
            .role(CommandRole::EventCall)
            .desc("Executes the event script specified by Event."),
        CommandDescriptor::new("loop_units", CommandTag::Miscellaneous)
            .keywords(&["Condition", "Event"])
            .desc("The first argument to this command should be a Python expression that evaluates to a list of unit nids."),
        CommandDescriptor::new("change_roaming", CommandTag::Miscellaneous)
            .keywords(&["Bool"])
            .desc("Turn free roam mode on or off"),
        CommandDescriptor::new("change_roaming_unit", CommandTag::Miscellaneous)
            .keywords(&["Unit"])
            .desc("Changes the level"),
        CommandDescriptor::new("clean_up_roaming", CommandTag::Miscellaneous)
            .desc("Removes all units other than the roaming unit"),
        CommandDescriptor::new("add_to_initiative", CommandTag::Miscellaneous)
            .keywords(&["Unit", "Integer"])
            .desc("Adds the specified unit to the specified point in the initiative order."),
        CommandDescriptor::new("move_in_initiative", CommandTag::Miscellaneous)
            .keywords(&["Unit", "Integer"])
            .desc("Moves the initiative of the specified unit."),
        CommandDescriptor::new("pair_up", CommandTag::Miscellaneous)
            .keywords(&["Unit", "Unit"])
            .desc("Pairs the first unit into the second"),
        CommandDescriptor::new("separate", CommandTag::Miscellaneous)
            .keywords(&["Unit"])
            .desc("Sets the unit"),
        CommandDescriptor::new("overworld_cinematic", CommandTag::Overworld)
            .optional_keywords(&["OverworldNID"])
            .desc("Sets the background to the overworld, allowing us to create cutscenes set in the overworld"),
        CommandDescriptor::new("set_overworld_position", CommandTag::Overworld)
            .keywords(&["OverworldEntity", "OverworldLocation"])
            .flags(&["no_animate"])
            .desc("Sets the position of a specific party in the overworld to a specific coordinate or node in the overworld"),
        CommandDescriptor::new("overworld_move_unit", CommandTag::Overworld)
            .alias("omove")
            .keywords(&["OverworldEntity"])
            .optional_keywords(&["OverworldLocation", "Float", "PointList"])
            .flags(&["no_block", "no_follow", "disable_after", "no_sound"])
            .desc("Issues a move command to OverworldEntity to move from its current position to given OverworldLocation."),
        CommandDescriptor::new("reveal_overworld_node", CommandTag::Overworld)
            .keywords(&["OverworldNodeNID"])
            .optional_keywords(&["Bool"])
            .desc("Reveals an overworld node on the map: moves the camera to the new location, plays the animation, and fades in the nodes."),
        CommandDescriptor::new("reveal_overworld_road", CommandTag::Overworld)
            .keywords(&["OverworldNodeNID", "OverworldNodeNID"])
            .optional_keywords(&["Bool"])
            .desc("Enables a road between two overworld nodes."),
        CommandDescriptor::new("create_overworld_entity", CommandTag::Overworld)
            .keywords(&["Nid"])
            .optional_keywords(&["Unit"])
            .flags(&["delete"])
            .desc("Create an overworld entity in memory with nid Nid."),
        CommandDescriptor::new("disable_overworld_entity", CommandTag::Overworld)
            .keywords(&["Nid"])
            .flags(&["no_animate"])
            .desc("remove an overworld entity from the map, with or without animation"),
        CommandDescriptor::new("toggle_narration_mode", CommandTag::DialogueText)
            .keywords(&["Direction"])
            .optional_keywords(&["Speed"])
            .desc("Enter or exit a full-screen narration mode."),
    ]
}

#[cfg(test)]
mod commands_tests {
    use super::*;

    #[test]
    fn lookup_by_id_and_alias() {
        let registry = CommandRegistry::builtin();
        let speak = registry.get("speak").expect("speak should exist");
        assert_eq!(speak.alias.as_deref(), Some("s"));
        assert_eq!(speak.keywords, vec!["Speaker", "Text"]);
        assert!(speak.accepts_flag("no_block"));
        assert_eq!(registry.get("s").map(|d| d.id.as_str()), Some("speak"));
        assert!(registry.get("not_a_real_command").is_none());
    }

    #[test]
    fn roles_drive_classification() {
        let registry = CommandRegistry::builtin();
        for id in ["battle_save", "prep", "base"] {
            assert!(registry.is_save_point(id), "{} should be a save point", id);
        }
        assert!(registry.is_event_call("trigger_script"));
        assert!(registry.is_event_call("trigger_script_with_args"));
        for id in ["if", "elif", "else", "end", "for", "endf", "comment"] {
            assert!(!registry.is_python_callable(id), "{} is structural", id);
        }
        assert!(registry.is_python_callable("speak"));
        assert!(registry.is_python_callable("break"));
        assert!(!registry.is_python_callable("missing"));
    }

    #[test]
    fn enumeration_is_stable_and_unique() {
        let registry = CommandRegistry::builtin();
        let first = registry.iter().map(|d| d.id.clone()).collect::<Vec<_>>();
        let second = registry.iter().map(|d| d.id.clone()).collect::<Vec<_>>();
        assert_eq!(first, second);
        assert_eq!(first[0], "comment");
        let unique = first.iter().collect::<std::collections::BTreeSet<_>>();
        assert_eq!(unique.len(), registry.len());
    }

    #[test]
    fn repeated_parameter_names_get_distinct_slots() {
        let descriptor = CommandDescriptor::new("pair", CommandTag::Hidden)
            .keywords(&["Unit", "Position"])
            .optional_keywords(&["Unit"]);
        assert_eq!(descriptor.parameter_slots(), vec!["Unit", "Position", "Unit2"]);
    }

    #[test]
    fn injected_catalogue_keeps_first_definition() {
        let mut descriptors = builtin_descriptors();
        descriptors.push(CommandDescriptor::new("speak", CommandTag::Hidden));
        descriptors.push(
            CommandDescriptor::new("shake_screen", CommandTag::Miscellaneous)
                .optional_keywords(&["Time"]),
        );
        let registry = CommandRegistry::new(descriptors);
        assert_eq!(
            registry.get("speak").map(|d| d.tag),
            Some(CommandTag::DialogueText)
        );
        assert!(registry.is_python_callable("shake_screen"));
        assert!(!CommandRegistry::builtin().is_python_callable("shake_screen"));
    }
}
