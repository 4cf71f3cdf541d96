mod head_node;
mod sensor;
