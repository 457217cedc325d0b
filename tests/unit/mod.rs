mod scoring_properties;
mod symbol_filter;
