//! Demo: scan a card and exercise a sector over the in-process simulator.

use farecard::{
    ReaderBuilder,
    card::Card,
    sector::{AuthMode, Sector},
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut reader = ReaderBuilder::new().with_simulator().build()?;

    println!("firmware version: {}", reader.get_version()?);
    reader.field_on()?;

    let mut card = Card::new();
    card.scan(&mut reader)?;
    println!("card type: 0x{:04x}, sn: {:02x?}", card.kind, card.sn.sn);

    // Sector 0 has no entry in the fixed access table, so it keeps its
    // default key 0 rather than needing a table lookup here.
    let mut sector = Sector::new(0, 0, AuthMode::Static);
    sector.authenticate(&mut reader, &card)?;
    sector.blocks[0] = [0xAB; 16];
    sector.write_block(&mut reader, 0, 0xFF)?;
    let data = sector.read_block(&mut reader, 0, 0xFF)?;
    println!("sector 0 block 0: {data:02x?}");

    reader.field_off()?;
    Ok(())
}
