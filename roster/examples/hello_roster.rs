//! Hello Roster Example
//!
//! Two nodes exchange membership facts and one of them leaves.

use std::net::{IpAddr, Ipv4Addr};

use roster::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    roster::logging::init("roster=info");

    println!("Roster Hello Example");
    println!("====================");

    let config_a = RosterConfig::new(Member::new(
        "node-a",
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
        7946,
    ))
    .with_gone_timeout_secs(60)
    .with_tag("role", "api");
    let config_b = RosterConfig::new(Member::new(
        "node-b",
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
        7946,
    ));

    let a = Roster::new(config_a)?;
    let b = Roster::new(config_b)?;
    let sweeper = a.spawn_sweeper();

    // Each node announces itself and hears the other
    let join_a = a.join();
    let join_b = b.join();
    println!("a hears b join: {:?}", a.observe(join_b));
    println!("b hears a join: {:?}", b.observe(join_a.clone()));

    // A retransmitted join is dropped by the ordering gate
    println!("b hears a join again: {:?}", b.observe(join_a));

    let leave_b = b.leave();
    println!("a hears b leave: {:?}", a.observe(leave_b));

    println!("\nView from node-a:");
    for status in a.membership().members() {
        println!(
            "  {} {} (t={})",
            status.member.name, status.member.state, status.last_message_time
        );
    }

    let sweeps = sweeper.stop().await;
    println!("\nSweeper stopped after {sweeps} sweeps");

    Ok(())
}
