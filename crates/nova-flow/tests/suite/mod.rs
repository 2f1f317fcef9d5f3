mod class_leaks;
mod javac_leaks;
mod lattice_props;
