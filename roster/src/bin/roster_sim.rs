//! Replays a cluster's membership history through one observer with the
//! gossip shuffled and duplicated, then prints the observer's view.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use rand::rngs::StdRng;
use rand::SeedableRng;

use roster::net::MockNetwork;
use roster::prelude::*;

fn usage() -> ! {
    eprintln!("Usage: roster_sim [nodes] [seed] [duplicate_every]");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  roster_sim 12 7 3");
    std::process::exit(2);
}

fn parse_arg<T: std::str::FromStr>(args: &mut Vec<String>, default: T) -> T {
    if args.is_empty() {
        return default;
    }
    match args.remove(0).parse() {
        Ok(value) => value,
        Err(_) => usage(),
    }
}

/// Every node joins, retags itself; every third leaves and every fifth is
/// then declared failed by a peer.
fn history(nodes: u8) -> Vec<MemberFact> {
    let mut facts = Vec::new();
    for i in 0..nodes {
        let member = Member::new(
            format!("node-{i:02}"),
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, i)),
            7946,
        );
        facts.push(MemberFact::join(member.clone(), LogicalTime::new(1)));
        facts.push(MemberFact::update(
            member.clone().with_tag("generation", "2"),
            LogicalTime::new(2),
        ));
        if i % 3 == 0 {
            facts.push(MemberFact::leave(member.name.clone(), LogicalTime::new(3)));
        }
        if i % 5 == 0 {
            facts.push(MemberFact::failed(member.name, LogicalTime::new(4)));
        }
    }
    facts
}

fn main() {
    let mut args = std::env::args().skip(1).collect::<Vec<_>>();
    if args.first().map(String::as_str) == Some("--help") {
        usage();
    }
    let nodes: u8 = parse_arg(&mut args, 8);
    let seed: u64 = parse_arg(&mut args, 1);
    let duplicate_every: usize = parse_arg(&mut args, 3);
    if !args.is_empty() || nodes == 0 {
        usage();
    }

    roster::logging::init("roster=warn");

    let observer = Member::new("observer", IpAddr::V4(Ipv4Addr::LOCALHOST), 7946);
    let roster = match Roster::new(RosterConfig::new(observer)) {
        Ok(roster) => roster,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    let handler = roster.gossip_handler(roster::net::MockTransport::new());

    let mut network = MockNetwork::new();
    for fact in history(nodes) {
        let origin = fact.origin.clone();
        match MemberMessage::new(fact).serialize() {
            Ok(bytes) => network.send(&origin, "observer", bytes),
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
    }

    let from: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut outcomes: BTreeMap<String, usize> = BTreeMap::new();
    for (_, bytes) in network.drain_shuffled("observer", &mut rng, duplicate_every) {
        let label = match handler.handle_bytes(from, &bytes) {
            Ok(Inbound::Fact(outcome)) => format!("{outcome:?}"),
            Ok(Inbound::Digest { .. }) => "Digest".to_string(),
            Err(e) => format!("error ({e})"),
        };
        *outcomes.entry(label).or_default() += 1;
    }

    println!("delivered:");
    for (outcome, count) in &outcomes {
        println!("  {outcome:<12} {count}");
    }

    let mut members = roster.membership().members();
    members.sort_by(|a, b| a.member.name.cmp(&b.member.name));
    println!("view ({} records):", members.len());
    for status in members {
        println!(
            "  {:<10} {:<8} t={}",
            status.member.name, status.member.state, status.last_message_time
        );
    }
}
