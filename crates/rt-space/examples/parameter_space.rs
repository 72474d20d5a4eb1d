use rt_space::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Ant colony optimisation tuning space");

    let space = ParameterSpace::builder()
        .add_categorical("algorithm", ["as", "mmas", "eas", "ras", "acs"])
        .add_categorical("localsearch", [0, 1, 2, 3])
        .add_real("alpha", 0, 5)
        .add_real("beta", 0, 10)
        .add_real("rho", 0.01, 1.0)
        .add_integer("ants", 5, 100)
        .add(Subspace::integer("nnls", 5, 50).when(value_of("localsearch").is_in([1, 2, 3])))
        .add(Subspace::real("q0", 0, 1).when(value_of("algorithm").eq("acs")))
        .add(Subspace::boolean("dlb").when(value_of("localsearch").ne(0)))
        .add(Subspace::integer("rasrank", 1, "ants").when(value_of("algorithm").eq("ras")))
        .add(Subspace::integer("elitistants", 1, 750).when(value_of("algorithm").eq("eas")))
        .forbid(value_of("alpha").eq(0).and(value_of("beta").eq(0)))
        .build()?;

    println!("{} parameters, {} forbidden clauses", space.len(), space.forbidden().len());
    print!("{space}");

    Ok(())
}
