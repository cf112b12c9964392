//! Drive a diff from code: in-memory producers, a pull loop, then a second
//! run pushed into a JSON consumer.
use anyhow::Result;
use streamdiff::{
    DiffOptions, DiffStatus, Differ, JsonRowConsumer, KeySpec, MemoryRowProducer, OutputOptions,
};

fn snapshots() -> (MemoryRowProducer, MemoryRowProducer) {
    let header = ["id", "name", "age"];
    let old = MemoryRowProducer::from_strs(
        &header,
        &[&["1", "john", "33"], &["2", "rachel", "22"], &["3", "mike", "45"]],
    );
    let new = MemoryRowProducer::from_strs(
        &header,
        &[&["1", "john", "33"], &["2", "rachel", "23"], &["4", "anna", "29"]],
    );
    (old, new)
}

#[tokio::main]
async fn main() -> Result<()> {
    let differ = Differ::new(DiffOptions::new([KeySpec::new("id")]))?;

    let (old, new) = snapshots();
    let mut session = differ.start(Box::new(old), Box::new(new)).await?;
    while let Some(diff) = session.next_diff().await? {
        if diff.status != DiffStatus::Same {
            println!("{:>8}  {:?}", diff.status.as_str(), diff.current_row());
        }
    }
    println!("stats: {:?}", session.stats());

    let (old, new) = snapshots();
    let mut session = differ.start(Box::new(old), Box::new(new)).await?;
    let mut json = JsonRowConsumer::new(Vec::new());
    let output = OutputOptions::default().label("source", "demo");
    session.to(&mut json, &output).await?;
    println!("{}", String::from_utf8(json.into_inner())?);

    Ok(())
}
