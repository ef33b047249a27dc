use std::collections::HashMap;

use anonize::{Collector, CollectorConfig, MasterSecret, ProofSystem};
use anyhow::{anyhow, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

const PARTICIPANTS: [(&str, &str); 5] = [
    ("alice@domain.com", "The new office layout makes focused work hard."),
    ("bob@domain.com", "I would like more flexibility in remote days."),
    ("carol@domain.com", "Team meetings run too long."),
    ("dave@domain.com", "The onboarding material is out of date."),
    ("erin@domain.com", "I am happy with my current workload."),
];

// Walks through the flow of participants answering a survey through an anonymizing collector.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let proof_system = match std::env::var("ANONIZE_PROOF").as_deref() {
        Ok("schnorr") => ProofSystem::SchnorrDiscreteLog,
        _ => ProofSystem::StubAlwaysAccept,
    };
    let collector = Collector::new(
        MasterSecret::generate(&mut rand::thread_rng()),
        CollectorConfig::default().with_proof_system(proof_system),
    );

    // Each participant registers, prepares their response locally, and submits it.
    let mut answers = HashMap::new();
    for (identity, answer) in PARTICIPANTS {
        let registration = collector.register(identity)?;
        let submission = collector.prepare(
            &registration.credential,
            &registration.pseudonym,
            answer.as_bytes(),
        )?;
        let receipt = collector.submit(submission)?;
        answers.insert(receipt.submission_id, identity);
        println!(
            "{identity} submitted; {} waiting in the mix",
            collector.pending_count()
        );
    }

    collector.settle().await;
    println!(
        "Collector holds {} submissions from {} pseudonyms",
        collector.stored_count(),
        collector.pseudonym_count()
    );

    for summary in collector.submissions() {
        println!(
            "  #{}: pseudonym {:02x?}.. ciphertext {} bytes",
            summary.index,
            &summary.pseudonym.as_bytes()[..6],
            summary.ciphertext_len
        );
    }

    let exported = rmp_serde::to_vec_named(&collector.records())?;
    info!(bytes = exported.len(), "exported stored records");

    // Without the submitter's consent, nothing is revealed.
    if let Err(err) = collector.request_disclosure(0, false) {
        println!("Disclosure of #0 without consent: {err}");
    }

    // Each submitter then consents to disclosure of their own submission.
    for (index, record) in collector.records().iter().enumerate() {
        let identity = answers
            .get(&record.submission_id)
            .ok_or_else(|| anyhow!("stored submission was never submitted"))?;
        let plaintext = collector.request_disclosure(index, true)?;
        println!(
            "#{index} disclosed with consent of {identity}: {}",
            String::from_utf8_lossy(&plaintext)
        );
    }

    Ok(())
}
