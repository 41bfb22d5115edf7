//! BDD Tests for the Deathmatch referee

use cucumber::{given, then, when, World};
use deathmatch_core::*;
use std::collections::HashMap;

#[derive(Debug, World)]
#[world(init = Self::new)]
struct MatchWorld {
    state: Match<()>,
    ids: HashMap<String, AgentId>,
    next_id: AgentId,
    failed_launches: Vec<String>,
    sent: Vec<(AgentId, Outbound)>,
    terminated: Vec<AgentId>,
    outcome: Option<MatchOutcome>,
}

impl MatchWorld {
    fn new() -> Self {
        Self {
            state: Match::new(),
            ids: HashMap::new(),
            next_id: 4100,
            failed_launches: Vec::new(),
            sent: Vec::new(),
            terminated: Vec::new(),
            outcome: None,
        }
    }

    fn id_of(&self, name: &str) -> AgentId {
        *self
            .ids
            .get(name)
            .unwrap_or_else(|| panic!("agent {name} was never launched"))
    }

    fn record(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Release(ids) => {
                    self.sent
                        .extend(ids.into_iter().map(|id| (id, Outbound::Begin)));
                }
                Effect::Send { to, message } => self.sent.push((to, message)),
                Effect::Terminate { id, .. } => self.terminated.push(id),
                Effect::Finished(outcome) => self.outcome = Some(outcome),
                Effect::Display { .. } | Effect::Violation { .. } => {}
            }
        }
    }

    fn begins_for(&self, id: AgentId) -> usize {
        self.sent
            .iter()
            .filter(|(to, message)| *to == id && *message == Outbound::Begin)
            .count()
    }

    fn opponents_for(&self, id: AgentId) -> Vec<String> {
        self.sent
            .iter()
            .filter_map(|(to, message)| match message {
                Outbound::Opponent { name, .. } if *to == id => Some(name.clone()),
                _ => None,
            })
            .collect()
    }
}

#[given(expr = "agent {word} is launched")]
async fn given_agent_launched(world: &mut MatchWorld, name: String) {
    let id = world.next_id;
    world.next_id += 1;
    world
        .state
        .register(Agent::new(id, name.clone(), "", ()))
        .expect("registration should succeed");
    world.ids.insert(name, id);
}

#[given(expr = "agent {word} fails to launch")]
async fn given_agent_fails_to_launch(world: &mut MatchWorld, name: String) {
    world.failed_launches.push(name);
}

#[given("launch is complete")]
async fn given_launch_complete(world: &mut MatchWorld) {
    let effects = world.state.apply(RefereeEvent::LaunchComplete);
    world.record(effects);
}

#[when(expr = "agent {word} reports ready")]
async fn when_agent_reports_ready(world: &mut MatchWorld, name: String) {
    let id = world.id_of(&name);
    let effects = world.state.receive(id, b"Ready!\n");
    world.record(effects);
}

#[when(expr = "agent {word} sights agent {word}")]
async fn when_agent_sights(world: &mut MatchWorld, hunter: String, target: String) {
    let hunter = world.id_of(&hunter);
    let line = format!("PID:{}\n", world.id_of(&target));
    let effects = world.state.receive(hunter, line.as_bytes());
    world.record(effects);
}

#[when(expr = "agent {word} reports sighting of id {int}")]
async fn when_agent_reports_sighting_of_id(world: &mut MatchWorld, hunter: String, target: u32) {
    let hunter = world.id_of(&hunter);
    let line = format!("PID:{target}\n");
    let effects = world.state.receive(hunter, line.as_bytes());
    world.record(effects);
}

#[when(expr = "agent {word} exits")]
async fn when_agent_exits(world: &mut MatchWorld, name: String) {
    let id = world.id_of(&name);
    let effects = world.state.apply(RefereeEvent::Exited(id));
    world.record(effects);
}

#[when(expr = "agents {word} and {word} exit together")]
async fn when_agents_exit_together(world: &mut MatchWorld, first: String, second: String) {
    let ids = [world.id_of(&first), world.id_of(&second)];
    let effects = world.state.apply_exits(&ids);
    world.record(effects);
}

#[then("no agent should have been released")]
async fn then_no_agent_released(world: &mut MatchWorld) {
    assert!(!world.state.is_released());
    assert!(world.sent.iter().all(|(_, message)| *message != Outbound::Begin));
}

#[then("every agent should receive Begin exactly once")]
async fn then_every_agent_begins_once(world: &mut MatchWorld) {
    for id in world.ids.values() {
        assert_eq!(world.begins_for(*id), 1, "agent {id}");
    }
}

#[then(expr = "{int} agents should receive Begin")]
async fn then_n_agents_receive_begin(world: &mut MatchWorld, count: usize) {
    let released = world
        .ids
        .values()
        .filter(|id| world.begins_for(**id) == 1)
        .count();
    assert_eq!(released, count);
    assert!(world
        .failed_launches
        .iter()
        .all(|name| !world.ids.contains_key(name)));
}

#[then(expr = "the expected population should be {int}")]
async fn then_expected_population(world: &mut MatchWorld, count: usize) {
    assert_eq!(world.state.expected(), count);
}

#[then(expr = "agent {word} should be told about opponent {word}")]
async fn then_told_about_opponent(world: &mut MatchWorld, hunter: String, target: String) {
    let hunter = world.id_of(&hunter);
    assert_eq!(world.opponents_for(hunter), vec![target]);
}

#[then(expr = "agent {word} should not be told about any opponent")]
async fn then_not_told_about_opponent(world: &mut MatchWorld, hunter: String) {
    let hunter = world.id_of(&hunter);
    assert!(world.opponents_for(hunter).is_empty());
}

#[then(expr = "{int} agents should be alive")]
async fn then_alive_count(world: &mut MatchWorld, count: usize) {
    assert_eq!(world.state.alive_count(), count);
    assert_eq!(world.state.recount_alive(), count);
}

#[then("there should be no winner yet")]
async fn then_no_winner_yet(world: &mut MatchWorld) {
    assert!(world.outcome.is_none());
    assert!(!world.state.is_terminal());
}

#[then(expr = "agent {word} should be forcibly terminated once")]
async fn then_forcibly_terminated_once(world: &mut MatchWorld, name: String) {
    let id = world.id_of(&name);
    let count = world.terminated.iter().filter(|t| **t == id).count();
    assert_eq!(count, 1);
}

#[then(expr = "agent {word} should be the winner")]
async fn then_agent_is_winner(world: &mut MatchWorld, name: String) {
    let outcome = world.outcome.as_ref().expect("match should be finished");
    assert_eq!(outcome.winner.as_ref().map(|w| w.name.as_str()), Some(name.as_str()));
    assert!(world.state.is_terminal());
}

#[then("the match should end without a winner")]
async fn then_no_winner(world: &mut MatchWorld) {
    let outcome = world.outcome.as_ref().expect("match should be finished");
    assert!(outcome.winner.is_none());
}

#[tokio::main]
async fn main() {
    MatchWorld::run("tests/features").await;
}
