mod calculation_tests;
mod consolidation_tests;
mod dataset_tests;
mod parser_tests;
