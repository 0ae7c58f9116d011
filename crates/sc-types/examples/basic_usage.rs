use sc_types::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Simulator calibration basic usage example");

    // A log2 range: raw values are exponents
    let bandwidth = CalibrationRange::new(6.0, 10.0, Scale::Log2).with_unit("MBps");
    bandwidth.validate("bandwidth")?;
    println!("bandwidth at exponent 8: {}", bandwidth.scale.realize(8.0, bandwidth.unit()));

    // BUFFER_SIZE may also be unbounded
    let buffer = CalibrationRange::new(20.0, 30.0, Scale::Log2)
        .with_unit("B")
        .with_infinity();
    buffer.validate("BUFFER_SIZE")?;

    let mut space = ParameterSpace::new();
    space.push(ParameterSpec::new(
        vec!["storage".into(), "bandwidth".into()],
        ParameterKind::Numeric(NumericDomain::from_range("bandwidth", &bandwidth)?),
    ))?;
    space.push(ParameterSpec::new(
        vec!["storage".into(), "BUFFER_SIZE".into()],
        ParameterKind::ConditionalPair {
            body: NumericDomain::from_range("BUFFER_SIZE", &buffer)?,
        },
    ))?;
    println!("Search space has {} parameters", space.len());

    // One optimizer sample, with the buffer gate closed
    let sample = ConfigurationSample::new()
        .with("storage-bandwidth", SampleValue::Int(9))
        .with(gate_name("storage-BUFFER_SIZE"), SampleValue::Choice(GATE_INFINITY.into()))
        .with("storage-BUFFER_SIZE", SampleValue::Float(f64::NAN));

    // Capture it as a calibration and realize it again
    let calibration = Calibration::from_sample(space.iter(), &sample);
    let mut realized = RealizedConfiguration::new();
    calibration.apply_to(&mut realized);
    println!("Realized configuration:\n{}", realized.to_pretty_json()?);

    // Calibrations survive a JSON round trip
    let text = serde_json::to_string(&calibration)?;
    let restored: Calibration = serde_json::from_str(&text)?;
    assert_eq!(restored, calibration);
    println!("Calibration with {} values serialized in {} bytes", restored.len(), text.len());

    // Contradictory ranges are rejected
    let bad = CalibrationRange::new(4.0, 4.0, Scale::Linear).with_infinity();
    if let Err(e) = bad.validate("MAX_NUM_CONCURRENT_DATA_CONNECTIONS") {
        println!("Rejected range: {e}");
    }

    Ok(())
}
